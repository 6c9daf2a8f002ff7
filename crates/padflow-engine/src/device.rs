use padflow_control::{ControlIndex, ControllerLayout};

/// Uniform access to a physical device: poll everything, then read values.
///
/// Implementations are moved onto the scheduler thread once attached.
pub trait Device: Send + 'static {
    /// Controls exposed by the device. Must not change after attach.
    fn layout(&self) -> &ControllerLayout;

    /// Refreshes every control. Returns false when the device has failed.
    fn poll(&mut self) -> bool;

    /// Instantaneous value of `control` as of the last [`Device::poll`].
    ///
    /// Absolute controls report [-1, 1]; relative axes are unrestricted.
    fn read_raw(&self, control: ControlIndex) -> f32;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn layout(&self) -> &ControllerLayout {
        (**self).layout()
    }

    fn poll(&mut self) -> bool {
        (**self).poll()
    }

    fn read_raw(&self, control: ControlIndex) -> f32 {
        (**self).read_raw(control)
    }
}
