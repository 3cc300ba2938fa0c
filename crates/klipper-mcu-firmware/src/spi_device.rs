//! # SPI device objects
//!
//! Thin oid-indexed handles over [`SpiDriver`]. Bus ids `>= 0x80` select a
//! software (bit-banged) bus per §4.9; the driver decides what that means,
//! this module only forwards the id.

use crate::hal::{HalError, SpiDriver};
use crate::shutdown::ShutdownCause;

const SOFTWARE_BUS_THRESHOLD: u8 = 0x80;

pub struct SpiDevice {
    bus: u8,
    use_cs: bool,
    shutdown_message: Option<([u8; 8], usize)>,
}

impl SpiDevice {
    pub fn new(use_cs: bool) -> Self {
        Self { bus: 0, use_cs, shutdown_message: None }
    }

    pub fn is_software_bus(&self) -> bool {
        self.bus >= SOFTWARE_BUS_THRESHOLD
    }

    /// `spi_set_bus(oid, bus, mode, rate)`. Clock mode/rate are passed
    /// straight to the driver; this object only tracks the bus id for the
    /// hardware/software distinction and CS policy.
    pub fn set_bus(&mut self, bus: u8) {
        self.bus = bus;
    }

    pub fn config_shutdown_message(&mut self, message: &[u8]) {
        let mut buf = [0u8; 8];
        let len = message.len().min(buf.len());
        buf[..len].copy_from_slice(&message[..len]);
        self.shutdown_message = Some((buf, len));
    }

    /// `spi_transfer(oid, data)`: full-duplex, asserting/deasserting CS per
    /// `use_cs`.
    pub fn transfer(&mut self, spi: &mut impl SpiDriver, data: &mut [u8]) -> Result<(), ShutdownCause> {
        let bus = self.bus;
        self.with_cs(spi, |spi| spi.transfer(bus, data))
    }

    /// `spi_send(oid, data)`: write-only.
    pub fn send(&mut self, spi: &mut impl SpiDriver, data: &[u8]) -> Result<(), ShutdownCause> {
        let bus = self.bus;
        self.with_cs(spi, |spi| spi.send(bus, data))
    }

    fn with_cs(
        &mut self,
        spi: &mut impl SpiDriver,
        op: impl FnOnce(&mut dyn SpiDriver) -> Result<(), HalError>,
    ) -> Result<(), ShutdownCause> {
        if self.use_cs {
            spi.set_cs(self.bus, true).map_err(|_| ShutdownCause::SpiError)?;
        }
        let result = op(spi);
        if self.use_cs {
            let _ = spi.set_cs(self.bus, false);
        }
        result.map_err(|_| ShutdownCause::SpiError)
    }

    /// `config_spi_shutdown`: sends the pre-registered shutdown message, if
    /// any, before the bus is disarmed.
    pub fn shutdown(&mut self, spi: &mut impl SpiDriver) {
        if let Some((buf, len)) = self.shutdown_message {
            let _ = self.send(spi, &buf[..len]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockSpi {
        cs_history: heapless::Vec<bool, 8>,
        sent: heapless::Vec<u8, 16>,
    }
    impl SpiDriver for MockSpi {
        fn set_cs(&mut self, _bus: u8, asserted: bool) -> Result<(), HalError> {
            self.cs_history.push(asserted).unwrap();
            Ok(())
        }
        fn transfer(&mut self, _bus: u8, data: &mut [u8]) -> Result<(), HalError> {
            self.sent.extend_from_slice(data).unwrap();
            Ok(())
        }
        fn send(&mut self, _bus: u8, data: &[u8]) -> Result<(), HalError> {
            self.sent.extend_from_slice(data).unwrap();
            Ok(())
        }
    }

    #[test]
    fn cs_is_asserted_around_a_transfer_when_configured() {
        let mut d = SpiDevice::new(true);
        d.set_bus(1);
        let mut spi = MockSpi::default();
        let mut data = [1, 2, 3];
        d.transfer(&mut spi, &mut data).unwrap();
        assert_eq!(spi.cs_history.as_slice(), [true, false]);
    }

    #[test]
    fn software_bus_ids_are_recognized() {
        let mut d = SpiDevice::new(false);
        d.set_bus(0x80);
        assert!(d.is_software_bus());
    }

    #[test]
    fn shutdown_sends_the_registered_message() {
        let mut d = SpiDevice::new(false);
        d.config_shutdown_message(&[0xaa, 0x55]);
        let mut spi = MockSpi::default();
        d.shutdown(&mut spi);
        assert_eq!(spi.sent.as_slice(), [0xaa, 0x55]);
    }
}
