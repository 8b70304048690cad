use std::time::{Duration, Instant};

use coprocessor::{Board, CoprocessorConfig, Resources};
use hal::{SerialNumber, SystemControl, TickCounter, SERIAL_NUMBER_LEN};
use log::warn;

use crate::link::{self, PeerScript, SimIrq, SimLink};
use crate::sim::{SensorModel, SimAdc, SimMag};

const MAG_RATE_HZ: u32 = 50;
const LINK_RATE_HZ: u64 = 50;

/// Free-running microsecond counter
pub struct HostClock {
    start: Instant,
    ticks_per_us: f64,
}

impl HostClock {
    pub fn new(timer_rate: u32) -> Self {
        Self {
            start: Instant::now(),
            ticks_per_us: f64::from(timer_rate) / 1e6,
        }
    }
}

impl TickCounter for HostClock {
    fn ticks(&self) -> u32 {
        let us = self.start.elapsed().as_micros() as f64;
        // The hardware counter wraps at 32 bits
        ((us * self.ticks_per_us) as u64 & u64::from(u32::MAX)) as u32
    }
}

pub struct HostSystem {
    serial: SerialNumber,
}

impl HostSystem {
    pub fn new(id: &str) -> Self {
        let mut serial = [b'0'; SERIAL_NUMBER_LEN];
        for (dst, src) in serial.iter_mut().zip(id.bytes()) {
            *dst = src;
        }
        Self { serial }
    }
}

impl SystemControl for HostSystem {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }

    fn reset(&mut self) {
        warn!("Reset requested by peer, exiting");
        std::process::exit(0);
    }

    fn serial_number(&self) -> SerialNumber {
        self.serial
    }
}

/// Simulated coprocessor board: sensors and peer run on their own threads
pub struct SitlBoard {
    adc: SimAdc,
    mag: SimMag,
    link: SimLink,
    irq: SimIrq,
    clock: HostClock,
    system: HostSystem,
}

impl SitlBoard {
    pub fn new(config: &CoprocessorConfig, model: SensorModel, script: PeerScript) -> Self {
        let block_period = Duration::from_secs_f64(1.0 / f64::from(config.ekf_rate().max(1)));
        let mag = SimMag::new(model.mag_counts(), MAG_RATE_HZ);
        let adc = SimAdc::start(model, config.adc_oversampling, block_period);
        let (link, irq) = link::connect(script, Duration::from_millis(1000 / LINK_RATE_HZ));
        Self {
            adc,
            mag,
            link,
            irq,
            clock: HostClock::new(config.timer_rate),
            system: HostSystem::new("SITL"),
        }
    }
}

impl Board for SitlBoard {
    type Adc = SimAdc;
    type Mag = SimMag;
    type Link = SimLink;
    type Irq = SimIrq;
    type Clock = HostClock;
    type System = HostSystem;

    fn name(&self) -> &str {
        "sitl"
    }

    fn split_resources(self) -> Resources<Self> {
        Resources {
            adc: self.adc,
            mag: self.mag,
            link: self.link,
            irq: self.irq,
            clock: self.clock,
            system: self.system,
        }
    }
}
