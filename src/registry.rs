//! Handle registry for device contexts and virtual devices.
//!
//! Callers pick the integer handles. Contexts and virtual devices live in
//! separate namespaces, so the same number may name one of each. A live
//! handle cannot be reused until it is released or destroyed.

use crate::backend::{InputDevice, UinputBackend};
use crate::capability::{AbsInfo, DeviceIdentity, TypeCapability};
use crate::device::DeviceContext;
use crate::error::{Error, Handle, Result};
use crate::event::InputEvent;
use crate::uinput::VirtualDevice;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::os::fd::RawFd;
use std::path::PathBuf;

#[cfg(target_os = "linux")]
use crate::backend::linux::{EvdevNode, UinputControl};
#[cfg(target_os = "linux")]
use crate::uinput::UinputConfig;
#[cfg(target_os = "linux")]
use std::os::fd::OwnedFd;

/// Owns every live context and virtual device.
#[derive(Debug)]
pub struct Registry {
    contexts: HashMap<Handle, DeviceContext>,
    virtuals: HashMap<Handle, VirtualDevice>,
    uinput: Box<dyn UinputBackend>,
}

#[cfg(target_os = "linux")]
impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry creating virtual devices through `/dev/uinput`.
    #[cfg(target_os = "linux")]
    pub fn new() -> Self {
        Self::with_config(UinputConfig::default())
    }

    /// Registry with custom uinput paths.
    #[cfg(target_os = "linux")]
    pub fn with_config(config: UinputConfig) -> Self {
        Self::with_backend(Box::new(UinputControl::new(config)))
    }

    /// Registry using `backend` to create virtual devices.
    pub fn with_backend(uinput: Box<dyn UinputBackend>) -> Self {
        Self {
            contexts: HashMap::new(),
            virtuals: HashMap::new(),
            uinput,
        }
    }

    fn context(&self, handle: Handle) -> Result<&DeviceContext> {
        self.contexts.get(&handle).ok_or(Error::InvalidHandle(handle))
    }

    fn context_mut(&mut self, handle: Handle) -> Result<&mut DeviceContext> {
        self.contexts
            .get_mut(&handle)
            .ok_or(Error::InvalidHandle(handle))
    }

    fn virtual_mut(&mut self, handle: Handle) -> Result<&mut VirtualDevice> {
        self.virtuals
            .get_mut(&handle)
            .ok_or(Error::InvalidHandle(handle))
    }

    fn insert_context(&mut self, handle: Handle, ctx: DeviceContext) -> Result<()> {
        match self.contexts.entry(handle) {
            Entry::Occupied(_) => Err(Error::HandleInUse(handle)),
            Entry::Vacant(slot) => {
                slot.insert(ctx);
                Ok(())
            }
        }
    }

    /// Create an empty, unbound context under `handle`.
    pub fn new_context(&mut self, handle: Handle) -> Result<()> {
        self.insert_context(handle, DeviceContext::new())
    }

    /// Create a template under `dst` copying the capabilities and identity
    /// of context `src`.
    pub fn clone_as_template(&mut self, src: Handle, dst: Handle) -> Result<()> {
        let template = self.context(src)?.to_template();
        self.insert_context(dst, template)
    }

    /// Bind context `handle` to an open event device descriptor.
    ///
    /// The descriptor is owned by the context from here on and closed on
    /// release.
    #[cfg(target_os = "linux")]
    pub fn bind(&mut self, handle: Handle, fd: OwnedFd) -> Result<()> {
        let ctx = self.context_mut(handle)?;
        if ctx.is_bound() {
            return Err(Error::AlreadyBound);
        }
        let node = EvdevNode::from_fd(fd).map_err(Error::Bind)?;
        ctx.bind(Box::new(node))
    }

    /// Bind context `handle` to any [`InputDevice`].
    pub fn bind_device(&mut self, handle: Handle, device: Box<dyn InputDevice>) -> Result<()> {
        self.context_mut(handle)?.bind(device)
    }

    /// Close and forget context `handle`.
    pub fn release(&mut self, handle: Handle) -> Result<()> {
        let ctx = self
            .contexts
            .remove(&handle)
            .ok_or(Error::InvalidHandle(handle))?;
        ctx.release();
        Ok(())
    }

    pub fn identity(&self, handle: Handle) -> Result<&DeviceIdentity> {
        Ok(self.context(handle)?.identity())
    }

    pub fn set_identity(&mut self, handle: Handle, identity: DeviceIdentity) -> Result<()> {
        self.context_mut(handle)?.set_identity(identity)
    }

    /// `false` for unknown handles.
    pub fn has_type(&self, handle: Handle, event_type: u16) -> bool {
        self.contexts
            .get(&handle)
            .is_some_and(|ctx| ctx.has_type(event_type))
    }

    /// `false` for unknown handles.
    pub fn has_code(&self, handle: Handle, event_type: u16, code: u16) -> bool {
        self.contexts
            .get(&handle)
            .is_some_and(|ctx| ctx.has_code(event_type, code))
    }

    /// `false` for unknown handles.
    pub fn has_property(&self, handle: Handle, property: u16) -> bool {
        self.contexts
            .get(&handle)
            .is_some_and(|ctx| ctx.has_property(property))
    }

    pub fn capabilities(&self, handle: Handle) -> Result<Vec<TypeCapability>> {
        Ok(self.context(handle)?.capabilities())
    }

    pub fn abs_info(&self, handle: Handle, code: u16) -> Result<Option<AbsInfo>> {
        Ok(self.context(handle)?.abs_info(code))
    }

    pub fn properties(&self, handle: Handle) -> Result<Vec<u16>> {
        Ok(self.context(handle)?.properties())
    }

    pub fn enable_type(&mut self, handle: Handle, event_type: u16) -> Result<()> {
        self.context_mut(handle)?.enable_type(event_type)
    }

    pub fn disable_type(&mut self, handle: Handle, event_type: u16) -> Result<()> {
        self.context_mut(handle)?.disable_type(event_type)
    }

    pub fn enable_code(
        &mut self,
        handle: Handle,
        event_type: u16,
        code: u16,
        abs_info: Option<AbsInfo>,
    ) -> Result<()> {
        self.context_mut(handle)?
            .enable_code(event_type, code, abs_info)
    }

    pub fn disable_code(&mut self, handle: Handle, event_type: u16, code: u16) -> Result<()> {
        self.context_mut(handle)?.disable_code(event_type, code)
    }

    pub fn enable_property(&mut self, handle: Handle, property: u16) -> Result<()> {
        self.context_mut(handle)?.enable_property(property)
    }

    pub fn disable_property(&mut self, handle: Handle, property: u16) -> Result<()> {
        self.context_mut(handle)?.disable_property(property)
    }

    pub fn grab(&mut self, handle: Handle, enabled: bool) -> Result<()> {
        self.context_mut(handle)?.grab(enabled)
    }

    /// Poll context `handle` for its next event.
    pub fn next_event(&mut self, handle: Handle) -> Result<Option<InputEvent>> {
        self.context_mut(handle)?.next_event()
    }

    /// Descriptor of bound context `handle`, for an external poll loop.
    pub fn raw_fd(&self, handle: Handle) -> Result<RawFd> {
        self.context(handle)?.raw_fd()
    }

    /// Bound or template contexts supporting `event_type` (and `code`, if
    /// given), ascending by handle.
    pub fn find_with_capability(&self, event_type: u16, code: Option<u16>) -> Vec<Handle> {
        let mut found: Vec<Handle> = self
            .contexts
            .iter()
            .filter(|(_, ctx)| match code {
                Some(code) => ctx.has_code(event_type, code),
                None => ctx.has_type(event_type),
            })
            .map(|(&handle, _)| handle)
            .collect();
        found.sort_unstable();
        found
    }

    /// Live context handles, ascending.
    pub fn context_handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.contexts.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Live virtual device handles, ascending.
    pub fn virtual_handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.virtuals.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Create a virtual device under `handle` mirroring context `template`.
    /// Returns the uinput descriptor.
    pub fn create_virtual(&mut self, template: Handle, handle: Handle) -> Result<RawFd> {
        if self.virtuals.contains_key(&handle) {
            return Err(Error::HandleInUse(handle));
        }
        let ctx = self
            .contexts
            .get(&template)
            .ok_or(Error::InvalidHandle(template))?;
        let device = VirtualDevice::create_from(ctx, self.uinput.as_mut())?;
        let fd = device.raw_fd();
        self.virtuals.insert(handle, device);
        Ok(fd)
    }

    /// Device node of virtual device `handle`, `None` until the kernel
    /// has named it.
    pub fn dev_node(&mut self, handle: Handle) -> Result<Option<PathBuf>> {
        Ok(self.virtual_mut(handle)?.devnode().map(PathBuf::from))
    }

    pub fn write_event(&mut self, handle: Handle, event_type: u16, code: u16, value: i32) -> Result<()> {
        self.virtual_mut(handle)?
            .write_event(event_type, code, value)
    }

    pub fn write_syn_report(&mut self, handle: Handle) -> Result<()> {
        self.virtual_mut(handle)?.write_syn_report()
    }

    pub fn write_frame(&mut self, handle: Handle, events: &[InputEvent]) -> Result<()> {
        self.virtual_mut(handle)?.write_frame(events)
    }

    /// Remove virtual device `handle` from the kernel and forget it.
    pub fn destroy(&mut self, handle: Handle) -> Result<()> {
        self.virtuals
            .remove(&handle)
            .ok_or(Error::InvalidHandle(handle))?
            .destroy()
    }

    /// Destroy every virtual device and release every context.
    pub fn close_all(&mut self) {
        for (handle, device) in self.virtuals.drain() {
            if let Err(e) = device.destroy() {
                log::warn!("failed to destroy virtual device {}: {}", handle, e);
            }
        }
        for (_, ctx) in self.contexts.drain() {
            ctx.release();
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockDevice, MockDeviceHandle, MockUinput};
    use crate::capability::Capabilities;
    use crate::codes::*;

    fn registry() -> (Registry, MockUinput) {
        let backend = MockUinput::new();
        (Registry::with_backend(Box::new(backend.clone())), backend)
    }

    fn joystick() -> MockDevice {
        let mut caps = Capabilities::new();
        caps.enable_code(EV_KEY, BTN_TRIGGER, None).unwrap();
        caps.enable_code(EV_ABS, ABS_X, Some(AbsInfo::new(-32768, 32767, 16, 128, 0)))
            .unwrap();
        caps.enable_code(EV_ABS, ABS_Y, Some(AbsInfo::new(-32768, 32767, 16, 128, 0)))
            .unwrap();
        let identity = DeviceIdentity {
            name: "Test Stick".into(),
            bustype: 0x03,
            vendor: 0x044f,
            product: 0xb10a,
            version: 0x0100,
            ..DeviceIdentity::default()
        };
        MockDevice::new(identity, caps)
    }

    fn bound(registry: &mut Registry, handle: Handle) -> MockDeviceHandle {
        let device = joystick();
        let mock = device.handle();
        registry.new_context(handle).unwrap();
        registry.bind_device(handle, Box::new(device)).unwrap();
        mock
    }

    #[test]
    fn test_handle_in_use() {
        let (mut registry, _) = registry();
        registry.new_context(1).unwrap();
        assert!(matches!(registry.new_context(1), Err(Error::HandleInUse(1))));
        registry.release(1).unwrap();
        registry.new_context(1).unwrap();
    }

    #[test]
    fn test_operations_after_release() {
        let (mut registry, _) = registry();
        let mock = bound(&mut registry, 3);
        registry.release(3).unwrap();
        assert!(mock.is_closed());

        assert!(matches!(registry.release(3), Err(Error::InvalidHandle(3))));
        assert!(matches!(registry.next_event(3), Err(Error::InvalidHandle(3))));
        assert!(matches!(registry.identity(3), Err(Error::InvalidHandle(3))));
        assert!(matches!(registry.capabilities(3), Err(Error::InvalidHandle(3))));
        assert!(matches!(registry.grab(3, true), Err(Error::InvalidHandle(3))));
        assert!(matches!(
            registry.enable_type(3, EV_KEY),
            Err(Error::InvalidHandle(3))
        ));
        assert!(!registry.has_type(3, EV_KEY));
        assert!(!registry.has_code(3, EV_ABS, ABS_X));
        assert!(!registry.has_property(3, INPUT_PROP_POINTER));
    }

    #[test]
    fn test_queries_on_bound_context() {
        let (mut registry, _) = registry();
        bound(&mut registry, 7);
        assert_eq!(registry.identity(7).unwrap().name, "Test Stick");
        assert!(registry.has_code(7, EV_KEY, BTN_TRIGGER));
        assert!(!registry.has_type(7, EV_SYN));
        let caps = registry.capabilities(7).unwrap();
        assert_eq!(caps.len(), 2);
        assert_eq!(caps[1].codes.len(), 2);
        assert_eq!(
            registry.abs_info(7, ABS_Y).unwrap().unwrap().flat,
            128
        );
    }

    #[test]
    fn test_event_pump_through_registry() {
        let (mut registry, _) = registry();
        let mock = bound(&mut registry, 1);
        mock.push(EV_ABS, ABS_X, 100);
        mock.push_drop();
        mock.push(EV_ABS, ABS_Y, -100);

        assert_eq!(registry.next_event(1).unwrap().unwrap().value, 100);
        assert_eq!(registry.next_event(1).unwrap().unwrap().value, -100);
        assert_eq!(registry.next_event(1).unwrap(), None);
    }

    #[test]
    fn test_mirror_bound_device() {
        let (mut registry, backend) = registry();
        bound(&mut registry, 1);

        registry.create_virtual(1, 1).unwrap();
        let created = &backend.created()[0];
        assert_eq!(
            created.capabilities.abs_info(ABS_X),
            Some(AbsInfo::new(-32768, 32767, 16, 128, 0))
        );
        assert_eq!(created.identity.vendor, 0x044f);

        registry.write_event(1, EV_ABS, ABS_X, 5).unwrap();
        registry.write_syn_report(1).unwrap();
        assert!(matches!(
            registry.write_event(1, EV_REL, REL_X, 1),
            Err(Error::NotDeclared { .. })
        ));
        assert_eq!(backend.created()[0].written.len(), 2);
    }

    #[test]
    fn test_virtual_handles() {
        let (mut registry, backend) = registry();
        registry.new_context(1).unwrap();
        registry.enable_code(1, EV_KEY, KEY_A, None).unwrap();

        assert!(matches!(registry.create_virtual(2, 1), Err(Error::InvalidHandle(2))));
        registry.create_virtual(1, 10).unwrap();
        assert!(matches!(registry.create_virtual(1, 10), Err(Error::HandleInUse(10))));
        assert_eq!(registry.virtual_handles(), vec![10]);

        assert_eq!(registry.dev_node(10).unwrap(), None);
        backend.assign_devnodes();
        assert!(registry.dev_node(10).unwrap().is_some());

        registry.destroy(10).unwrap();
        assert!(backend.created()[0].destroyed);
        assert!(matches!(registry.destroy(10), Err(Error::InvalidHandle(10))));
        assert!(matches!(
            registry.write_syn_report(10),
            Err(Error::InvalidHandle(10))
        ));
        assert!(matches!(registry.dev_node(10), Err(Error::InvalidHandle(10))));
    }

    #[test]
    fn test_empty_template_cannot_create() {
        let (mut registry, _) = registry();
        registry.new_context(1).unwrap();
        assert!(matches!(registry.create_virtual(1, 1), Err(Error::Create(_))));
        assert!(registry.virtual_handles().is_empty());
    }

    #[test]
    fn test_clone_as_template() {
        let (mut registry, _) = registry();
        bound(&mut registry, 1);
        registry.clone_as_template(1, 2).unwrap();
        registry.enable_code(2, EV_KEY, BTN_THUMB, None).unwrap();
        assert!(registry.has_code(2, EV_KEY, BTN_THUMB));
        assert!(!registry.has_code(1, EV_KEY, BTN_THUMB));
        assert!(matches!(
            registry.enable_code(1, EV_KEY, BTN_THUMB, None),
            Err(Error::CapabilitiesFixed)
        ));
        assert!(matches!(registry.clone_as_template(1, 2), Err(Error::HandleInUse(2))));
        assert!(matches!(registry.clone_as_template(9, 4), Err(Error::InvalidHandle(9))));
    }

    #[test]
    fn test_find_with_capability() {
        let (mut registry, _) = registry();
        bound(&mut registry, 5);
        bound(&mut registry, 2);
        registry.new_context(9).unwrap();
        registry.enable_code(9, EV_REL, REL_X, None).unwrap();

        assert_eq!(registry.find_with_capability(EV_ABS, None), vec![2, 5]);
        assert_eq!(registry.find_with_capability(EV_REL, Some(REL_X)), vec![9]);
        assert!(registry.find_with_capability(EV_KEY, Some(KEY_A)).is_empty());
        assert_eq!(registry.context_handles(), vec![2, 5, 9]);
    }

    #[test]
    fn test_close_all() {
        let (mut registry, backend) = registry();
        let mock = bound(&mut registry, 1);
        registry.create_virtual(1, 1).unwrap();
        registry.close_all();
        assert!(mock.is_closed());
        assert!(backend.created()[0].destroyed);
        assert!(registry.context_handles().is_empty());
    }
}
