/// Receive path of an emulated NIC.
///
/// The poll thread owns the NIC handle for the duration of a session and calls
/// [`NicReceiver::receive`] once per delivered host → guest frame. Implementations typically
/// enqueue the frame into the device model's RX queue; they must not call back into
/// [`crate::SlirpBackend`].
pub trait NicReceiver {
    fn receive(&mut self, frame: &[u8]);
}

impl<T: NicReceiver + ?Sized> NicReceiver for Box<T> {
    fn receive(&mut self, frame: &[u8]) {
        <T as NicReceiver>::receive(&mut **self, frame);
    }
}

impl<T: NicReceiver + ?Sized> NicReceiver for &mut T {
    fn receive(&mut self, frame: &[u8]) {
        <T as NicReceiver>::receive(&mut **self, frame);
    }
}

impl NicReceiver for () {
    fn receive(&mut self, _frame: &[u8]) {}
}

impl<N: NicReceiver> NicReceiver for Option<N> {
    fn receive(&mut self, frame: &[u8]) {
        if let Some(nic) = self.as_mut() {
            nic.receive(frame);
        }
    }
}

impl<T: NicReceiver + ?Sized> NicReceiver for std::sync::Mutex<T> {
    fn receive(&mut self, frame: &[u8]) {
        self.get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .receive(frame);
    }
}

impl<T: NicReceiver + ?Sized> NicReceiver for std::sync::Arc<std::sync::Mutex<T>> {
    fn receive(&mut self, frame: &[u8]) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .receive(frame);
    }
}

/// Forward received frames over a channel, e.g. to a device model living on the emulator thread.
impl NicReceiver for std::sync::mpsc::Sender<Vec<u8>> {
    fn receive(&mut self, frame: &[u8]) {
        // A hung-up receiver means the device went away; the frame has nowhere to go.
        let _ = self.send(frame.to_vec());
    }
}
