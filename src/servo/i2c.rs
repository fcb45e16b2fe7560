//! rppal I2C binding for the PCA9685 register bus.

use rppal::i2c::I2c;

use crate::error::{ArmError, Result};
use crate::servo::RegisterBus;

/// SMBus byte access to one I2C slave.
pub struct I2cRegisters {
    i2c: I2c,
}

impl I2cRegisters {
    /// Open `/dev/i2c-<bus>` and address the chip.
    pub fn open(bus: u8, address: u16) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus)
            .map_err(|e| ArmError::Servo(format!("Failed to open I2C bus {}: {}", bus, e)))?;
        i2c.set_slave_address(address)
            .map_err(|e| ArmError::Servo(format!("Failed to address 0x{:02x}: {}", address, e)))?;

        log::info!("Opened I2C bus {} at address 0x{:02x}", bus, address);
        Ok(Self { i2c })
    }
}

impl RegisterBus for I2cRegisters {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.i2c
            .smbus_write_byte(register, value)
            .map_err(|e| ArmError::Servo(format!("write 0x{:02x}: {}", register, e)))
    }

    fn read_register(&mut self, register: u8) -> Result<u8> {
        self.i2c
            .smbus_read_byte(register)
            .map_err(|e| ArmError::Servo(format!("read 0x{:02x}: {}", register, e)))
    }
}
