/// Modem UART wrapper that never stalls or fails on transmit.
///
/// # Note
/// When the transmitter is not ready, or the write fails, the outgoing bytes are dropped and
/// reported as written. Telemetry is advisory; losing a line must never hold up the caller.
pub struct BestEffortInterface<T>(T);

impl<T> BestEffortInterface<T>
where
    T: embedded_io::Write
        + embedded_io::WriteReady
        + embedded_io::Read
        + embedded_io::ReadReady,
{
    pub fn new(interface: T) -> Self {
        Self(interface)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> embedded_io::ErrorType for BestEffortInterface<T>
where
    T: embedded_io::ErrorType,
{
    type Error = <T as embedded_io::ErrorType>::Error;
}

impl<T> embedded_io::Write for BestEffortInterface<T>
where
    T: embedded_io::Write + embedded_io::WriteReady,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self.0.write_ready() {
            Ok(true) => {
                if let Err(e) = self.0.write_all(buf) {
                    log::trace!("Dropped {} telemetry bytes: {e:?}", buf.len());
                }
            }
            _ => log::trace!("Modem busy, dropped {} bytes", buf.len()),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush().ok();
        Ok(())
    }
}

impl<T> embedded_io::Read for BestEffortInterface<T>
where
    T: embedded_io::Read,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0.read(buf)
    }
}

impl<T> embedded_io::ReadReady for BestEffortInterface<T>
where
    T: embedded_io::ReadReady,
{
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.0.read_ready()
    }
}
