//! Sensor and output-pin capabilities
//!
//! The responder only needs a temperature and one digital output. Hardware
//! access lives behind these traits; simulated implementations back the tests
//! and the host binary.

/// Reference voltage over the 12-bit ADC range
pub const ADC_CONVERSION_FACTOR: f32 = 3.3 / (1 << 12) as f32;

/// Sensor voltage at 27 °C
const VOLTS_AT_27C: f32 = 0.706;

/// Sensor slope in volts per °C
const VOLTS_PER_DEGREE: f32 = 0.001721;

/// Convert a raw 12-bit reading of the on-die sensor to degrees Celsius
#[inline]
pub fn raw_to_celsius(raw: u16) -> f32 {
    let volts = f32::from(raw) * ADC_CONVERSION_FACTOR;
    27.0 - (volts - VOLTS_AT_27C) / VOLTS_PER_DEGREE
}

/// Temperature source
pub trait TemperatureSensor {
    /// One raw conversion from the temperature channel
    fn read_raw(&mut self) -> u16;

    /// One conversion, calibrated to °C
    fn read_temperature(&mut self) -> f32 {
        raw_to_celsius(self.read_raw())
    }
}

/// Single digital output
pub trait OutputPin {
    fn set_output(&mut self, on: bool);

    fn output(&self) -> bool;

    /// GPIO number shown on the control page
    fn pin_id(&self) -> u8;
}

/// The capability pair the control page works with
#[derive(Debug)]
pub struct Board<S, O> {
    pub sensor: S,
    pub output: O,
}

impl<S: TemperatureSensor, O: OutputPin> Board<S, O> {
    pub fn new(sensor: S, output: O) -> Self {
        Self { sensor, output }
    }
}

/// Sensor returning a fixed raw reading, optionally wobbling around it
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    raw: u16,
    wobble: u16,
    reads: u64,
}

impl SimulatedSensor {
    /// Always returns `raw`
    pub fn new(raw: u16) -> Self {
        Self {
            raw,
            wobble: 0,
            reads: 0,
        }
    }

    /// Cycle through `raw - wobble ..= raw + wobble`
    pub fn with_wobble(mut self, wobble: u16) -> Self {
        self.wobble = wobble;
        self
    }

    /// Number of conversions performed so far
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl Default for SimulatedSensor {
    /// Reads close to 27 °C
    fn default() -> Self {
        Self::new(876)
    }
}

impl TemperatureSensor for SimulatedSensor {
    fn read_raw(&mut self) -> u16 {
        self.reads += 1;
        if self.wobble == 0 {
            return self.raw;
        }
        let span = u64::from(self.wobble) * 2 + 1;
        let offset = (self.reads % span) as u16;
        self.raw
            .saturating_sub(self.wobble)
            .saturating_add(offset)
            .min(4095)
    }
}

/// Output pin kept in memory; starts low
#[derive(Debug, Clone)]
pub struct SimulatedPin {
    pin: u8,
    state: bool,
    writes: u64,
}

impl SimulatedPin {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            state: false,
            writes: 0,
        }
    }

    /// Number of `set_output` calls so far
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl OutputPin for SimulatedPin {
    fn set_output(&mut self, on: bool) {
        self.writes += 1;
        self.state = on;
    }

    fn output(&self) -> bool {
        self.state
    }

    fn pin_id(&self) -> u8 {
        self.pin
    }
}
