//! # I2C device objects
//!
//! Thin oid-indexed handles over [`I2cDriver`]. Not the hard part of the
//! firmware, but every bus error here is a `try_shutdown` trigger, so the
//! plumbing has to be right.

use crate::hal::{HalError, I2cDriver};
use crate::shutdown::ShutdownCause;

pub struct I2cDevice {
    bus: u8,
    addr: u8,
}

impl I2cDevice {
    pub fn new() -> Self {
        Self { bus: 0, addr: 0 }
    }

    /// `i2c_set_bus(oid, bus, addr)`.
    pub fn set_bus(&mut self, bus: u8, addr: u8) {
        self.bus = bus;
        self.addr = addr;
    }

    /// `i2c_write(oid, data)`.
    pub fn write(&mut self, i2c: &mut impl I2cDriver, data: &[u8]) -> Result<(), ShutdownCause> {
        i2c.write(self.bus, self.addr, data).map_err(|_| ShutdownCause::I2cError)
    }

    /// `i2c_read(oid, reg, read_len)`.
    pub fn read(&mut self, i2c: &mut impl I2cDriver, reg: &[u8], into: &mut [u8]) -> Result<(), ShutdownCause> {
        i2c.read(self.bus, self.addr, reg, into).map_err(|_| ShutdownCause::I2cError)
    }
}

impl Default for I2cDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingI2c;
    impl I2cDriver for FailingI2c {
        fn write(&mut self, _bus: u8, _addr: u8, _data: &[u8]) -> Result<(), HalError> {
            Err(HalError::BusError)
        }
        fn read(&mut self, _bus: u8, _addr: u8, _reg: &[u8], _into: &mut [u8]) -> Result<(), HalError> {
            Err(HalError::BusError)
        }
    }

    #[test]
    fn bus_error_maps_to_shutdown_cause() {
        let mut d = I2cDevice::new();
        d.set_bus(0, 0x68);
        let mut bus = FailingI2c;
        assert_eq!(d.write(&mut bus, &[1, 2]), Err(ShutdownCause::I2cError));
    }
}
