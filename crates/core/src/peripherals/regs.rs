//! Peripheral register file.
//!
//! Only four of the 128 bus addresses are backed by storage. The decoder turns
//! an address into a [`Register`] before committing, so [`RegisterFile::set`]
//! cannot be handed an unrecognized address.

/// Output enable, one bit per `uo_out` pin.
pub const ADDR_OUTPUT_ENABLE: u8 = 0x00;
/// Raw value mirrored on `uio_out`.
pub const ADDR_DIRECT_OUTPUT: u8 = 0x01;
/// PWM select, one bit per `uo_out` pin.
pub const ADDR_PWM_MODE: u8 = 0x02;
/// PWM duty cycle, 0 = 0 %, 255 = 100 %.
pub const ADDR_PWM_DUTY: u8 = 0x04;

/// A recognized register address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    OutputEnable,
    DirectOutput,
    PwmMode,
    PwmDuty,
}

impl Register {
    pub const ALL: [Register; 4] = [
        Register::OutputEnable,
        Register::DirectOutput,
        Register::PwmMode,
        Register::PwmDuty,
    ];

    /// Map a 7-bit bus address to a register. `None` for unbacked addresses.
    pub fn from_addr(addr: u8) -> Option<Register> {
        match addr {
            ADDR_OUTPUT_ENABLE => Some(Register::OutputEnable),
            ADDR_DIRECT_OUTPUT => Some(Register::DirectOutput),
            ADDR_PWM_MODE => Some(Register::PwmMode),
            ADDR_PWM_DUTY => Some(Register::PwmDuty),
            _ => None,
        }
    }

    pub fn addr(self) -> u8 {
        match self {
            Register::OutputEnable => ADDR_OUTPUT_ENABLE,
            Register::DirectOutput => ADDR_DIRECT_OUTPUT,
            Register::PwmMode => ADDR_PWM_MODE,
            Register::PwmDuty => ADDR_PWM_DUTY,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::OutputEnable => "EN_OUT",
            Register::DirectOutput => "DIRECT",
            Register::PwmMode => "PWM_SEL",
            Register::PwmDuty => "DUTY",
        }
    }

    fn index(self) -> usize {
        match self {
            Register::OutputEnable => 0,
            Register::DirectOutput => 1,
            Register::PwmMode => 2,
            Register::PwmDuty => 3,
        }
    }
}

/// Storage for the recognized registers. Power-on value is all zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    values: [u8; 4],
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile { values: [0; 4] }
    }

    pub fn reset(&mut self) {
        *self = RegisterFile::new();
    }

    /// Value at a bus address; 0 for addresses with no backing register.
    pub fn get(&self, addr: u8) -> u8 {
        Register::from_addr(addr).map_or(0, |r| self.read(r))
    }

    pub fn read(&self, reg: Register) -> u8 {
        self.values[reg.index()]
    }

    /// Overwrite a register. Returns the previous value.
    pub fn set(&mut self, reg: Register, value: u8) -> u8 {
        std::mem::replace(&mut self.values[reg.index()], value)
    }

    pub fn output_enable(&self) -> u8 {
        self.read(Register::OutputEnable)
    }

    pub fn direct_output(&self) -> u8 {
        self.read(Register::DirectOutput)
    }

    pub fn pwm_mode(&self) -> u8 {
        self.read(Register::PwmMode)
    }

    pub fn pwm_duty(&self) -> u8 {
        self.read(Register::PwmDuty)
    }

    /// Raw values in [`Register::ALL`] order, for save states.
    pub fn values(&self) -> [u8; 4] {
        self.values
    }

    pub fn load_values(&mut self, values: [u8; 4]) {
        self.values = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_round_trip() {
        for reg in Register::ALL {
            assert_eq!(Register::from_addr(reg.addr()), Some(reg));
        }
        assert_eq!(Register::from_addr(0x03), None);
        assert_eq!(Register::from_addr(0x30), None);
        assert_eq!(Register::from_addr(0x7F), None);
    }

    #[test]
    fn test_defaults_zero() {
        let rf = RegisterFile::new();
        for addr in 0..=0x7F {
            assert_eq!(rf.get(addr), 0);
        }
    }

    #[test]
    fn test_set_get_reset() {
        let mut rf = RegisterFile::new();
        assert_eq!(rf.set(Register::PwmDuty, 0x80), 0);
        assert_eq!(rf.set(Register::PwmDuty, 0x81), 0x80);
        rf.set(Register::OutputEnable, 0xF0);
        assert_eq!(rf.get(ADDR_PWM_DUTY), 0x81);
        assert_eq!(rf.output_enable(), 0xF0);
        assert_eq!(rf.get(0x30), 0);
        rf.reset();
        assert_eq!(rf.values(), [0; 4]);
    }
}
