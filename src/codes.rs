//! Event type and event code tables.
//!
//! Mirrors `linux/input-event-codes.h`: every type, code and input property
//! the kernel names is available as a `pub const`, and the tables behind
//! them answer name <-> number lookups. Unknown numbers map to
//! [`UNKNOWN_NAME`] rather than failing, the way the kernel tolerates codes
//! it does not recognize.

/// Name returned for ids the tables do not know.
pub const UNKNOWN_NAME: &str = "UNKNOWN";

macro_rules! event_codes {
    ($table:ident { $($name:ident = $value:expr),* $(,)? }) => {
        $(pub const $name: u16 = $value;)*

        const $table: &[(u16, &str)] = &[$(($value, stringify!($name))),*];
    };
}

/// Highest event type number.
pub const EV_MAX: u16 = 0x1f;
/// Number of event type slots.
pub const EV_CNT: u16 = EV_MAX + 1;
/// Number of input property slots.
pub const INPUT_PROP_CNT: u16 = 0x20;

event_codes!(TYPE_NAMES {
    EV_SYN = 0x00,
    EV_KEY = 0x01,
    EV_REL = 0x02,
    EV_ABS = 0x03,
    EV_MSC = 0x04,
    EV_SW = 0x05,
    EV_LED = 0x11,
    EV_SND = 0x12,
    EV_REP = 0x14,
    EV_FF = 0x15,
    EV_PWR = 0x16,
    EV_FF_STATUS = 0x17,
});

event_codes!(SYN_NAMES {
    SYN_REPORT = 0,
    SYN_CONFIG = 1,
    SYN_MT_REPORT = 2,
    SYN_DROPPED = 3,
});

event_codes!(KEY_NAMES {
    KEY_RESERVED = 0,
    KEY_ESC = 1,
    KEY_1 = 2,
    KEY_2 = 3,
    KEY_3 = 4,
    KEY_4 = 5,
    KEY_5 = 6,
    KEY_6 = 7,
    KEY_7 = 8,
    KEY_8 = 9,
    KEY_9 = 10,
    KEY_0 = 11,
    KEY_MINUS = 12,
    KEY_EQUAL = 13,
    KEY_BACKSPACE = 14,
    KEY_TAB = 15,
    KEY_Q = 16,
    KEY_W = 17,
    KEY_E = 18,
    KEY_R = 19,
    KEY_T = 20,
    KEY_Y = 21,
    KEY_U = 22,
    KEY_I = 23,
    KEY_O = 24,
    KEY_P = 25,
    KEY_LEFTBRACE = 26,
    KEY_RIGHTBRACE = 27,
    KEY_ENTER = 28,
    KEY_LEFTCTRL = 29,
    KEY_A = 30,
    KEY_S = 31,
    KEY_D = 32,
    KEY_F = 33,
    KEY_G = 34,
    KEY_H = 35,
    KEY_J = 36,
    KEY_K = 37,
    KEY_L = 38,
    KEY_SEMICOLON = 39,
    KEY_APOSTROPHE = 40,
    KEY_GRAVE = 41,
    KEY_LEFTSHIFT = 42,
    KEY_BACKSLASH = 43,
    KEY_Z = 44,
    KEY_X = 45,
    KEY_C = 46,
    KEY_V = 47,
    KEY_B = 48,
    KEY_N = 49,
    KEY_M = 50,
    KEY_COMMA = 51,
    KEY_DOT = 52,
    KEY_SLASH = 53,
    KEY_RIGHTSHIFT = 54,
    KEY_KPASTERISK = 55,
    KEY_LEFTALT = 56,
    KEY_SPACE = 57,
    KEY_CAPSLOCK = 58,
    KEY_F1 = 59,
    KEY_F2 = 60,
    KEY_F3 = 61,
    KEY_F4 = 62,
    KEY_F5 = 63,
    KEY_F6 = 64,
    KEY_F7 = 65,
    KEY_F8 = 66,
    KEY_F9 = 67,
    KEY_F10 = 68,
    KEY_NUMLOCK = 69,
    KEY_SCROLLLOCK = 70,
    KEY_KP7 = 71,
    KEY_KP8 = 72,
    KEY_KP9 = 73,
    KEY_KPMINUS = 74,
    KEY_KP4 = 75,
    KEY_KP5 = 76,
    KEY_KP6 = 77,
    KEY_KPPLUS = 78,
    KEY_KP1 = 79,
    KEY_KP2 = 80,
    KEY_KP3 = 81,
    KEY_KP0 = 82,
    KEY_KPDOT = 83,
    KEY_ZENKAKUHANKAKU = 85,
    KEY_102ND = 86,
    KEY_F11 = 87,
    KEY_F12 = 88,
    KEY_RO = 89,
    KEY_KATAKANA = 90,
    KEY_HIRAGANA = 91,
    KEY_HENKAN = 92,
    KEY_KATAKANAHIRAGANA = 93,
    KEY_MUHENKAN = 94,
    KEY_KPJPCOMMA = 95,
    KEY_KPENTER = 96,
    KEY_RIGHTCTRL = 97,
    KEY_KPSLASH = 98,
    KEY_SYSRQ = 99,
    KEY_RIGHTALT = 100,
    KEY_LINEFEED = 101,
    KEY_HOME = 102,
    KEY_UP = 103,
    KEY_PAGEUP = 104,
    KEY_LEFT = 105,
    KEY_RIGHT = 106,
    KEY_END = 107,
    KEY_DOWN = 108,
    KEY_PAGEDOWN = 109,
    KEY_INSERT = 110,
    KEY_DELETE = 111,
    KEY_MACRO = 112,
    KEY_MUTE = 113,
    KEY_VOLUMEDOWN = 114,
    KEY_VOLUMEUP = 115,
    KEY_POWER = 116,
    KEY_KPEQUAL = 117,
    KEY_KPPLUSMINUS = 118,
    KEY_PAUSE = 119,
    KEY_SCALE = 120,
    KEY_KPCOMMA = 121,
    KEY_HANGEUL = 122,
    KEY_HANJA = 123,
    KEY_YEN = 124,
    KEY_LEFTMETA = 125,
    KEY_RIGHTMETA = 126,
    KEY_COMPOSE = 127,
    KEY_STOP = 128,
    KEY_AGAIN = 129,
    KEY_PROPS = 130,
    KEY_UNDO = 131,
    KEY_FRONT = 132,
    KEY_COPY = 133,
    KEY_OPEN = 134,
    KEY_PASTE = 135,
    KEY_FIND = 136,
    KEY_CUT = 137,
    KEY_HELP = 138,
    KEY_MENU = 139,
    KEY_CALC = 140,
    KEY_SETUP = 141,
    KEY_SLEEP = 142,
    KEY_WAKEUP = 143,
    KEY_FILE = 144,
    KEY_SENDFILE = 145,
    KEY_DELETEFILE = 146,
    KEY_XFER = 147,
    KEY_PROG1 = 148,
    KEY_PROG2 = 149,
    KEY_WWW = 150,
    KEY_MSDOS = 151,
    KEY_COFFEE = 152,
    KEY_ROTATE_DISPLAY = 153,
    KEY_CYCLEWINDOWS = 154,
    KEY_MAIL = 155,
    KEY_BOOKMARKS = 156,
    KEY_COMPUTER = 157,
    KEY_BACK = 158,
    KEY_FORWARD = 159,
    KEY_CLOSECD = 160,
    KEY_EJECTCD = 161,
    KEY_EJECTCLOSECD = 162,
    KEY_NEXTSONG = 163,
    KEY_PLAYPAUSE = 164,
    KEY_PREVIOUSSONG = 165,
    KEY_STOPCD = 166,
    KEY_RECORD = 167,
    KEY_REWIND = 168,
    KEY_PHONE = 169,
    KEY_ISO = 170,
    KEY_CONFIG = 171,
    KEY_HOMEPAGE = 172,
    KEY_REFRESH = 173,
    KEY_EXIT = 174,
    KEY_MOVE = 175,
    KEY_EDIT = 176,
    KEY_SCROLLUP = 177,
    KEY_SCROLLDOWN = 178,
    KEY_KPLEFTPAREN = 179,
    KEY_KPRIGHTPAREN = 180,
    KEY_NEW = 181,
    KEY_REDO = 182,
    KEY_F13 = 183,
    KEY_F14 = 184,
    KEY_F15 = 185,
    KEY_F16 = 186,
    KEY_F17 = 187,
    KEY_F18 = 188,
    KEY_F19 = 189,
    KEY_F20 = 190,
    KEY_F21 = 191,
    KEY_F22 = 192,
    KEY_F23 = 193,
    KEY_F24 = 194,
    KEY_PLAYCD = 200,
    KEY_PAUSECD = 201,
    KEY_PROG3 = 202,
    KEY_PROG4 = 203,
    KEY_ALL_APPLICATIONS = 204,
    KEY_SUSPEND = 205,
    KEY_CLOSE = 206,
    KEY_PLAY = 207,
    KEY_FASTFORWARD = 208,
    KEY_BASSBOOST = 209,
    KEY_PRINT = 210,
    KEY_HP = 211,
    KEY_CAMERA = 212,
    KEY_SOUND = 213,
    KEY_QUESTION = 214,
    KEY_EMAIL = 215,
    KEY_CHAT = 216,
    KEY_SEARCH = 217,
    KEY_CONNECT = 218,
    KEY_FINANCE = 219,
    KEY_SPORT = 220,
    KEY_SHOP = 221,
    KEY_ALTERASE = 222,
    KEY_CANCEL = 223,
    KEY_BRIGHTNESSDOWN = 224,
    KEY_BRIGHTNESSUP = 225,
    KEY_MEDIA = 226,
    KEY_SWITCHVIDEOMODE = 227,
    KEY_KBDILLUMTOGGLE = 228,
    KEY_KBDILLUMDOWN = 229,
    KEY_KBDILLUMUP = 230,
    KEY_SEND = 231,
    KEY_REPLY = 232,
    KEY_FORWARDMAIL = 233,
    KEY_SAVE = 234,
    KEY_DOCUMENTS = 235,
    KEY_BATTERY = 236,
    KEY_BLUETOOTH = 237,
    KEY_WLAN = 238,
    KEY_UWB = 239,
    KEY_UNKNOWN = 240,
    KEY_VIDEO_NEXT = 241,
    KEY_VIDEO_PREV = 242,
    KEY_BRIGHTNESS_CYCLE = 243,
    KEY_BRIGHTNESS_AUTO = 244,
    KEY_DISPLAY_OFF = 245,
    KEY_WWAN = 246,
    KEY_RFKILL = 247,
    KEY_MICMUTE = 248,
    BTN_0 = 0x100,
    BTN_1 = 0x101,
    BTN_2 = 0x102,
    BTN_3 = 0x103,
    BTN_4 = 0x104,
    BTN_5 = 0x105,
    BTN_6 = 0x106,
    BTN_7 = 0x107,
    BTN_8 = 0x108,
    BTN_9 = 0x109,
    BTN_LEFT = 0x110,
    BTN_RIGHT = 0x111,
    BTN_MIDDLE = 0x112,
    BTN_SIDE = 0x113,
    BTN_EXTRA = 0x114,
    BTN_FORWARD = 0x115,
    BTN_BACK = 0x116,
    BTN_TASK = 0x117,
    BTN_TRIGGER = 0x120,
    BTN_THUMB = 0x121,
    BTN_THUMB2 = 0x122,
    BTN_TOP = 0x123,
    BTN_TOP2 = 0x124,
    BTN_PINKIE = 0x125,
    BTN_BASE = 0x126,
    BTN_BASE2 = 0x127,
    BTN_BASE3 = 0x128,
    BTN_BASE4 = 0x129,
    BTN_BASE5 = 0x12a,
    BTN_BASE6 = 0x12b,
    BTN_DEAD = 0x12f,
    BTN_SOUTH = 0x130,
    BTN_EAST = 0x131,
    BTN_C = 0x132,
    BTN_NORTH = 0x133,
    BTN_WEST = 0x134,
    BTN_Z = 0x135,
    BTN_TL = 0x136,
    BTN_TR = 0x137,
    BTN_TL2 = 0x138,
    BTN_TR2 = 0x139,
    BTN_SELECT = 0x13a,
    BTN_START = 0x13b,
    BTN_MODE = 0x13c,
    BTN_THUMBL = 0x13d,
    BTN_THUMBR = 0x13e,
    BTN_TOOL_PEN = 0x140,
    BTN_TOOL_RUBBER = 0x141,
    BTN_TOOL_BRUSH = 0x142,
    BTN_TOOL_PENCIL = 0x143,
    BTN_TOOL_AIRBRUSH = 0x144,
    BTN_TOOL_FINGER = 0x145,
    BTN_TOOL_MOUSE = 0x146,
    BTN_TOOL_LENS = 0x147,
    BTN_TOOL_QUINTTAP = 0x148,
    BTN_STYLUS3 = 0x149,
    BTN_TOUCH = 0x14a,
    BTN_STYLUS = 0x14b,
    BTN_STYLUS2 = 0x14c,
    BTN_TOOL_DOUBLETAP = 0x14d,
    BTN_TOOL_TRIPLETAP = 0x14e,
    BTN_TOOL_QUADTAP = 0x14f,
    BTN_GEAR_DOWN = 0x150,
    BTN_GEAR_UP = 0x151,
    KEY_OK = 0x160,
    KEY_SELECT = 0x161,
    KEY_GOTO = 0x162,
    KEY_CLEAR = 0x163,
    KEY_POWER2 = 0x164,
    KEY_OPTION = 0x165,
    KEY_INFO = 0x166,
    KEY_TIME = 0x167,
    KEY_VENDOR = 0x168,
    KEY_ARCHIVE = 0x169,
    KEY_PROGRAM = 0x16a,
    KEY_CHANNEL = 0x16b,
    KEY_FAVORITES = 0x16c,
    KEY_EPG = 0x16d,
    KEY_PVR = 0x16e,
    KEY_MHP = 0x16f,
    KEY_LANGUAGE = 0x170,
    KEY_TITLE = 0x171,
    KEY_SUBTITLE = 0x172,
    KEY_ANGLE = 0x173,
    KEY_FULL_SCREEN = 0x174,
    KEY_MODE = 0x175,
    KEY_KEYBOARD = 0x176,
    KEY_ASPECT_RATIO = 0x177,
    KEY_PC = 0x178,
    KEY_TV = 0x179,
    KEY_TV2 = 0x17a,
    KEY_VCR = 0x17b,
    KEY_VCR2 = 0x17c,
    KEY_SAT = 0x17d,
    KEY_SAT2 = 0x17e,
    KEY_CD = 0x17f,
    KEY_TAPE = 0x180,
    KEY_RADIO = 0x181,
    KEY_TUNER = 0x182,
    KEY_PLAYER = 0x183,
    KEY_TEXT = 0x184,
    KEY_DVD = 0x185,
    KEY_AUX = 0x186,
    KEY_MP3 = 0x187,
    KEY_AUDIO = 0x188,
    KEY_VIDEO = 0x189,
    KEY_DIRECTORY = 0x18a,
    KEY_LIST = 0x18b,
    KEY_MEMO = 0x18c,
    KEY_CALENDAR = 0x18d,
    KEY_RED = 0x18e,
    KEY_GREEN = 0x18f,
    KEY_YELLOW = 0x190,
    KEY_BLUE = 0x191,
    KEY_CHANNELUP = 0x192,
    KEY_CHANNELDOWN = 0x193,
    KEY_FIRST = 0x194,
    KEY_LAST = 0x195,
    KEY_AB = 0x196,
    KEY_NEXT = 0x197,
    KEY_RESTART = 0x198,
    KEY_SLOW = 0x199,
    KEY_SHUFFLE = 0x19a,
    KEY_BREAK = 0x19b,
    KEY_PREVIOUS = 0x19c,
    KEY_DIGITS = 0x19d,
    KEY_TEEN = 0x19e,
    KEY_TWEN = 0x19f,
    KEY_VIDEOPHONE = 0x1a0,
    KEY_GAMES = 0x1a1,
    KEY_ZOOMIN = 0x1a2,
    KEY_ZOOMOUT = 0x1a3,
    KEY_ZOOMRESET = 0x1a4,
    KEY_WORDPROCESSOR = 0x1a5,
    KEY_EDITOR = 0x1a6,
    KEY_SPREADSHEET = 0x1a7,
    KEY_GRAPHICSEDITOR = 0x1a8,
    KEY_PRESENTATION = 0x1a9,
    KEY_DATABASE = 0x1aa,
    KEY_NEWS = 0x1ab,
    KEY_VOICEMAIL = 0x1ac,
    KEY_ADDRESSBOOK = 0x1ad,
    KEY_MESSENGER = 0x1ae,
    KEY_DISPLAYTOGGLE = 0x1af,
    KEY_SPELLCHECK = 0x1b0,
    KEY_LOGOFF = 0x1b1,
    KEY_DOLLAR = 0x1b2,
    KEY_EURO = 0x1b3,
    KEY_FRAMEBACK = 0x1b4,
    KEY_FRAMEFORWARD = 0x1b5,
    KEY_CONTEXT_MENU = 0x1b6,
    KEY_MEDIA_REPEAT = 0x1b7,
    KEY_10CHANNELSUP = 0x1b8,
    KEY_10CHANNELSDOWN = 0x1b9,
    KEY_IMAGES = 0x1ba,
    KEY_DEL_EOL = 0x1c0,
    KEY_DEL_EOS = 0x1c1,
    KEY_INS_LINE = 0x1c2,
    KEY_DEL_LINE = 0x1c3,
    KEY_FN = 0x1d0,
    KEY_FN_ESC = 0x1d1,
    KEY_FN_F1 = 0x1d2,
    KEY_FN_F2 = 0x1d3,
    KEY_FN_F3 = 0x1d4,
    KEY_FN_F4 = 0x1d5,
    KEY_FN_F5 = 0x1d6,
    KEY_FN_F6 = 0x1d7,
    KEY_FN_F7 = 0x1d8,
    KEY_FN_F8 = 0x1d9,
    KEY_FN_F9 = 0x1da,
    KEY_FN_F10 = 0x1db,
    KEY_FN_F11 = 0x1dc,
    KEY_FN_F12 = 0x1dd,
    KEY_FN_1 = 0x1de,
    KEY_FN_2 = 0x1df,
    KEY_FN_D = 0x1e0,
    KEY_FN_E = 0x1e1,
    KEY_FN_F = 0x1e2,
    KEY_FN_S = 0x1e3,
    KEY_FN_B = 0x1e4,
    KEY_BRL_DOT1 = 0x1f1,
    KEY_BRL_DOT2 = 0x1f2,
    KEY_BRL_DOT3 = 0x1f3,
    KEY_BRL_DOT4 = 0x1f4,
    KEY_BRL_DOT5 = 0x1f5,
    KEY_BRL_DOT6 = 0x1f6,
    KEY_BRL_DOT7 = 0x1f7,
    KEY_BRL_DOT8 = 0x1f8,
    KEY_BRL_DOT9 = 0x1f9,
    KEY_BRL_DOT10 = 0x1fa,
    KEY_NUMERIC_0 = 0x200,
    KEY_NUMERIC_1 = 0x201,
    KEY_NUMERIC_2 = 0x202,
    KEY_NUMERIC_3 = 0x203,
    KEY_NUMERIC_4 = 0x204,
    KEY_NUMERIC_5 = 0x205,
    KEY_NUMERIC_6 = 0x206,
    KEY_NUMERIC_7 = 0x207,
    KEY_NUMERIC_8 = 0x208,
    KEY_NUMERIC_9 = 0x209,
    KEY_NUMERIC_STAR = 0x20a,
    KEY_NUMERIC_POUND = 0x20b,
    KEY_CAMERA_FOCUS = 0x210,
    KEY_WPS_BUTTON = 0x211,
    KEY_TOUCHPAD_TOGGLE = 0x212,
    KEY_TOUCHPAD_ON = 0x213,
    KEY_TOUCHPAD_OFF = 0x214,
    KEY_CAMERA_ZOOMIN = 0x215,
    KEY_CAMERA_ZOOMOUT = 0x216,
    KEY_CAMERA_UP = 0x217,
    KEY_CAMERA_DOWN = 0x218,
    KEY_CAMERA_LEFT = 0x219,
    KEY_CAMERA_RIGHT = 0x21a,
    KEY_ATTENDANT_ON = 0x21b,
    KEY_ATTENDANT_OFF = 0x21c,
    KEY_ATTENDANT_TOGGLE = 0x21d,
    KEY_LIGHTS_TOGGLE = 0x21e,
    BTN_DPAD_UP = 0x220,
    BTN_DPAD_DOWN = 0x221,
    BTN_DPAD_LEFT = 0x222,
    BTN_DPAD_RIGHT = 0x223,
    BTN_TRIGGER_HAPPY1 = 0x2c0,
    BTN_TRIGGER_HAPPY2 = 0x2c1,
    BTN_TRIGGER_HAPPY3 = 0x2c2,
    BTN_TRIGGER_HAPPY4 = 0x2c3,
    BTN_TRIGGER_HAPPY5 = 0x2c4,
    BTN_TRIGGER_HAPPY6 = 0x2c5,
    BTN_TRIGGER_HAPPY7 = 0x2c6,
    BTN_TRIGGER_HAPPY8 = 0x2c7,
    BTN_TRIGGER_HAPPY9 = 0x2c8,
    BTN_TRIGGER_HAPPY10 = 0x2c9,
    BTN_TRIGGER_HAPPY11 = 0x2ca,
    BTN_TRIGGER_HAPPY12 = 0x2cb,
    BTN_TRIGGER_HAPPY13 = 0x2cc,
    BTN_TRIGGER_HAPPY14 = 0x2cd,
    BTN_TRIGGER_HAPPY15 = 0x2ce,
    BTN_TRIGGER_HAPPY16 = 0x2cf,
    BTN_TRIGGER_HAPPY17 = 0x2d0,
    BTN_TRIGGER_HAPPY18 = 0x2d1,
    BTN_TRIGGER_HAPPY19 = 0x2d2,
    BTN_TRIGGER_HAPPY20 = 0x2d3,
    BTN_TRIGGER_HAPPY21 = 0x2d4,
    BTN_TRIGGER_HAPPY22 = 0x2d5,
    BTN_TRIGGER_HAPPY23 = 0x2d6,
    BTN_TRIGGER_HAPPY24 = 0x2d7,
    BTN_TRIGGER_HAPPY25 = 0x2d8,
    BTN_TRIGGER_HAPPY26 = 0x2d9,
    BTN_TRIGGER_HAPPY27 = 0x2da,
    BTN_TRIGGER_HAPPY28 = 0x2db,
    BTN_TRIGGER_HAPPY29 = 0x2dc,
    BTN_TRIGGER_HAPPY30 = 0x2dd,
    BTN_TRIGGER_HAPPY31 = 0x2de,
    BTN_TRIGGER_HAPPY32 = 0x2df,
    BTN_TRIGGER_HAPPY33 = 0x2e0,
    BTN_TRIGGER_HAPPY34 = 0x2e1,
    BTN_TRIGGER_HAPPY35 = 0x2e2,
    BTN_TRIGGER_HAPPY36 = 0x2e3,
    BTN_TRIGGER_HAPPY37 = 0x2e4,
    BTN_TRIGGER_HAPPY38 = 0x2e5,
    BTN_TRIGGER_HAPPY39 = 0x2e6,
    BTN_TRIGGER_HAPPY40 = 0x2e7,
});

event_codes!(REL_NAMES {
    REL_X = 0x00,
    REL_Y = 0x01,
    REL_Z = 0x02,
    REL_RX = 0x03,
    REL_RY = 0x04,
    REL_RZ = 0x05,
    REL_HWHEEL = 0x06,
    REL_DIAL = 0x07,
    REL_WHEEL = 0x08,
    REL_MISC = 0x09,
    REL_RESERVED = 0x0a,
    REL_WHEEL_HI_RES = 0x0b,
    REL_HWHEEL_HI_RES = 0x0c,
});

event_codes!(ABS_NAMES {
    ABS_X = 0x00,
    ABS_Y = 0x01,
    ABS_Z = 0x02,
    ABS_RX = 0x03,
    ABS_RY = 0x04,
    ABS_RZ = 0x05,
    ABS_THROTTLE = 0x06,
    ABS_RUDDER = 0x07,
    ABS_WHEEL = 0x08,
    ABS_GAS = 0x09,
    ABS_BRAKE = 0x0a,
    ABS_HAT0X = 0x10,
    ABS_HAT0Y = 0x11,
    ABS_HAT1X = 0x12,
    ABS_HAT1Y = 0x13,
    ABS_HAT2X = 0x14,
    ABS_HAT2Y = 0x15,
    ABS_HAT3X = 0x16,
    ABS_HAT3Y = 0x17,
    ABS_PRESSURE = 0x18,
    ABS_DISTANCE = 0x19,
    ABS_TILT_X = 0x1a,
    ABS_TILT_Y = 0x1b,
    ABS_TOOL_WIDTH = 0x1c,
    ABS_VOLUME = 0x20,
    ABS_PROFILE = 0x21,
    ABS_MISC = 0x28,
    ABS_RESERVED = 0x2e,
    ABS_MT_SLOT = 0x2f,
    ABS_MT_TOUCH_MAJOR = 0x30,
    ABS_MT_TOUCH_MINOR = 0x31,
    ABS_MT_WIDTH_MAJOR = 0x32,
    ABS_MT_WIDTH_MINOR = 0x33,
    ABS_MT_ORIENTATION = 0x34,
    ABS_MT_POSITION_X = 0x35,
    ABS_MT_POSITION_Y = 0x36,
    ABS_MT_TOOL_TYPE = 0x37,
    ABS_MT_BLOB_ID = 0x38,
    ABS_MT_TRACKING_ID = 0x39,
    ABS_MT_PRESSURE = 0x3a,
    ABS_MT_DISTANCE = 0x3b,
    ABS_MT_TOOL_X = 0x3c,
    ABS_MT_TOOL_Y = 0x3d,
});

event_codes!(MSC_NAMES {
    MSC_SERIAL = 0x00,
    MSC_PULSELED = 0x01,
    MSC_GESTURE = 0x02,
    MSC_RAW = 0x03,
    MSC_SCAN = 0x04,
    MSC_TIMESTAMP = 0x05,
});

event_codes!(SW_NAMES {
    SW_LID = 0x00,
    SW_TABLET_MODE = 0x01,
    SW_HEADPHONE_INSERT = 0x02,
    SW_RFKILL_ALL = 0x03,
    SW_MICROPHONE_INSERT = 0x04,
    SW_DOCK = 0x05,
    SW_LINEOUT_INSERT = 0x06,
    SW_JACK_PHYSICAL_INSERT = 0x07,
    SW_VIDEOOUT_INSERT = 0x08,
    SW_CAMERA_LENS_COVER = 0x09,
    SW_KEYPAD_SLIDE = 0x0a,
    SW_FRONT_PROXIMITY = 0x0b,
    SW_ROTATE_LOCK = 0x0c,
    SW_LINEIN_INSERT = 0x0d,
    SW_MUTE_DEVICE = 0x0e,
    SW_PEN_INSERTED = 0x0f,
    SW_MACHINE_COVER = 0x10,
});

event_codes!(LED_NAMES {
    LED_NUML = 0x00,
    LED_CAPSL = 0x01,
    LED_SCROLLL = 0x02,
    LED_COMPOSE = 0x03,
    LED_KANA = 0x04,
    LED_SLEEP = 0x05,
    LED_SUSPEND = 0x06,
    LED_MUTE = 0x07,
    LED_MISC = 0x08,
    LED_MAIL = 0x09,
    LED_CHARGING = 0x0a,
});

event_codes!(SND_NAMES {
    SND_CLICK = 0x00,
    SND_BELL = 0x01,
    SND_TONE = 0x02,
});

event_codes!(REP_NAMES {
    REP_DELAY = 0x00,
    REP_PERIOD = 0x01,
});

event_codes!(FF_NAMES {
    FF_RUMBLE = 0x50,
    FF_PERIODIC = 0x51,
    FF_CONSTANT = 0x52,
    FF_SPRING = 0x53,
    FF_FRICTION = 0x54,
    FF_DAMPER = 0x55,
    FF_INERTIA = 0x56,
    FF_RAMP = 0x57,
    FF_SQUARE = 0x58,
    FF_TRIANGLE = 0x59,
    FF_SINE = 0x5a,
    FF_SAW_UP = 0x5b,
    FF_SAW_DOWN = 0x5c,
    FF_CUSTOM = 0x5d,
    FF_GAIN = 0x60,
    FF_AUTOCENTER = 0x61,
});

event_codes!(FF_STATUS_NAMES {
    FF_STATUS_STOPPED = 0x00,
    FF_STATUS_PLAYING = 0x01,
});

event_codes!(PROP_NAMES {
    INPUT_PROP_POINTER = 0x00,
    INPUT_PROP_DIRECT = 0x01,
    INPUT_PROP_BUTTONPAD = 0x02,
    INPUT_PROP_SEMI_MT = 0x03,
    INPUT_PROP_TOPBUTTONPAD = 0x04,
    INPUT_PROP_POINTING_STICK = 0x05,
    INPUT_PROP_ACCELEROMETER = 0x06,
});

/// Kernel aliases that resolve by name but never print.
const CODE_ALIASES: &[(u16, &str, u16)] = &[
    (EV_KEY, "KEY_HANGUEL", KEY_HANGEUL),
    (EV_KEY, "KEY_SCREENLOCK", KEY_COFFEE),
    (EV_KEY, "KEY_DIRECTION", KEY_ROTATE_DISPLAY),
    (EV_KEY, "KEY_DASHBOARD", KEY_ALL_APPLICATIONS),
    (EV_KEY, "KEY_BRIGHTNESS_ZERO", KEY_BRIGHTNESS_AUTO),
    (EV_KEY, "KEY_WIMAX", KEY_WWAN),
    (EV_KEY, "BTN_MISC", BTN_0),
    (EV_KEY, "BTN_MOUSE", BTN_LEFT),
    (EV_KEY, "BTN_JOYSTICK", BTN_TRIGGER),
    (EV_KEY, "BTN_GAMEPAD", BTN_SOUTH),
    (EV_KEY, "BTN_A", BTN_SOUTH),
    (EV_KEY, "BTN_B", BTN_EAST),
    (EV_KEY, "BTN_X", BTN_NORTH),
    (EV_KEY, "BTN_Y", BTN_WEST),
    (EV_KEY, "BTN_DIGI", BTN_TOOL_PEN),
    (EV_KEY, "BTN_WHEEL", BTN_GEAR_DOWN),
    (EV_KEY, "BTN_TRIGGER_HAPPY", BTN_TRIGGER_HAPPY1),
    (EV_SW, "SW_RADIO", SW_RFKILL_ALL),
];

/// Static description of one event type.
#[derive(Debug)]
pub struct EventTypeInfo {
    /// Numeric type id.
    pub id: u16,
    /// Canonical name, e.g. `EV_KEY`.
    pub name: &'static str,
    /// Highest valid code, `None` for types that carry no codes.
    pub max_code: Option<u16>,
    prefixes: &'static [&'static str],
    codes: &'static [(u16, &'static str)],
}

impl EventTypeInfo {
    /// Number of code slots this type has.
    pub fn code_count(&self) -> usize {
        self.max_code.map_or(0, |max| usize::from(max) + 1)
    }

    /// Named codes of this type, ascending.
    pub fn codes(&self) -> impl Iterator<Item = (u16, &'static str)> + '_ {
        self.codes.iter().copied()
    }

    fn code_name(&self, code: u16) -> Option<&'static str> {
        self.codes
            .binary_search_by_key(&code, |&(value, _)| value)
            .ok()
            .map(|idx| self.codes[idx].1)
    }
}

static TYPES: &[EventTypeInfo] = &[
    EventTypeInfo {
        id: EV_SYN,
        name: "EV_SYN",
        max_code: Some(0x0f),
        prefixes: &["SYN_"],
        codes: SYN_NAMES,
    },
    EventTypeInfo {
        id: EV_KEY,
        name: "EV_KEY",
        max_code: Some(0x2ff),
        prefixes: &["KEY_", "BTN_"],
        codes: KEY_NAMES,
    },
    EventTypeInfo {
        id: EV_REL,
        name: "EV_REL",
        max_code: Some(0x0f),
        prefixes: &["REL_"],
        codes: REL_NAMES,
    },
    EventTypeInfo {
        id: EV_ABS,
        name: "EV_ABS",
        max_code: Some(0x3f),
        prefixes: &["ABS_"],
        codes: ABS_NAMES,
    },
    EventTypeInfo {
        id: EV_MSC,
        name: "EV_MSC",
        max_code: Some(0x07),
        prefixes: &["MSC_"],
        codes: MSC_NAMES,
    },
    EventTypeInfo {
        id: EV_SW,
        name: "EV_SW",
        max_code: Some(0x10),
        prefixes: &["SW_"],
        codes: SW_NAMES,
    },
    EventTypeInfo {
        id: EV_LED,
        name: "EV_LED",
        max_code: Some(0x0f),
        prefixes: &["LED_"],
        codes: LED_NAMES,
    },
    EventTypeInfo {
        id: EV_SND,
        name: "EV_SND",
        max_code: Some(0x07),
        prefixes: &["SND_"],
        codes: SND_NAMES,
    },
    EventTypeInfo {
        id: EV_REP,
        name: "EV_REP",
        max_code: Some(0x01),
        prefixes: &["REP_"],
        codes: REP_NAMES,
    },
    EventTypeInfo {
        id: EV_FF,
        name: "EV_FF",
        max_code: Some(0x7f),
        prefixes: &["FF_"],
        codes: FF_NAMES,
    },
    EventTypeInfo {
        id: EV_PWR,
        name: "EV_PWR",
        max_code: None,
        prefixes: &[],
        codes: &[],
    },
    EventTypeInfo {
        id: EV_FF_STATUS,
        name: "EV_FF_STATUS",
        max_code: Some(0x01),
        prefixes: &["FF_STATUS_"],
        codes: FF_STATUS_NAMES,
    },
];

/// Look up the static description of an event type.
pub fn type_info(event_type: u16) -> Option<&'static EventTypeInfo> {
    TYPES.iter().find(|info| info.id == event_type)
}

/// Every known event type with its named codes, in type order.
pub fn types_and_codes() -> impl Iterator<Item = &'static EventTypeInfo> {
    TYPES.iter()
}

/// Numeric id of an event type name such as `EV_ABS`.
pub fn type_from_name(name: &str) -> Option<u16> {
    TYPE_NAMES
        .iter()
        .find(|&&(_, n)| n == name)
        .map(|&(id, _)| id)
}

/// Name of an event type, or [`UNKNOWN_NAME`].
pub fn type_name(event_type: u16) -> &'static str {
    type_info(event_type).map_or(UNKNOWN_NAME, |info| info.name)
}

/// Number of code slots of an event type; zero for unknown types.
pub fn max_codes(event_type: u16) -> usize {
    type_info(event_type).map_or(0, EventTypeInfo::code_count)
}

/// Event type a code name belongs to, derived from its prefix.
///
/// The longest matching prefix wins, so `FF_STATUS_PLAYING` resolves to
/// `EV_FF_STATUS` rather than `EV_FF`.
pub fn type_for_code_name(name: &str) -> Option<u16> {
    TYPES
        .iter()
        .flat_map(|info| info.prefixes.iter().map(move |prefix| (info.id, *prefix)))
        .filter(|(_, prefix)| name.starts_with(prefix))
        .max_by_key(|(_, prefix)| prefix.len())
        .map(|(id, _)| id)
}

/// Numeric id of a code name such as `KEY_ESC` or `ABS_MT_SLOT`.
pub fn code_from_name(name: &str) -> Option<u16> {
    let event_type = type_for_code_name(name)?;
    let info = type_info(event_type)?;

    info.codes
        .iter()
        .find(|&&(_, n)| n == name)
        .map(|&(code, _)| code)
        .or_else(|| {
            CODE_ALIASES
                .iter()
                .find(|&&(t, n, _)| t == event_type && n == name)
                .map(|&(_, _, code)| code)
        })
}

/// Name of a code within its type, or [`UNKNOWN_NAME`].
pub fn code_name(event_type: u16, code: u16) -> &'static str {
    type_info(event_type)
        .and_then(|info| info.code_name(code))
        .unwrap_or(UNKNOWN_NAME)
}

/// Name of an input property, or [`UNKNOWN_NAME`].
pub fn property_name(property: u16) -> &'static str {
    PROP_NAMES
        .iter()
        .find(|&&(id, _)| id == property)
        .map_or(UNKNOWN_NAME, |&(_, name)| name)
}

/// Numeric id of an input property name such as `INPUT_PROP_DIRECT`.
pub fn property_from_name(name: &str) -> Option<u16> {
    PROP_NAMES
        .iter()
        .find(|&&(_, n)| n == name)
        .map(|&(id, _)| id)
}

/// All named input properties.
pub fn properties() -> impl Iterator<Item = (u16, &'static str)> {
    PROP_NAMES.iter().copied()
}
