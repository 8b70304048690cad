use crate::link::LinkTransport;
use hal::{InterruptControl, Magnetometer, SampleSource, SystemControl, TickCounter};

/// Hardware the coprocessor runs on
pub trait Board
where
    Self: Sized,
{
    type Adc: SampleSource;
    type Mag: Magnetometer;
    type Link: LinkTransport;
    type Irq: InterruptControl;
    type Clock: TickCounter;
    type System: SystemControl;

    fn name(&self) -> &str;

    fn split_resources(self) -> Resources<Self>;
}

pub struct Resources<B: Board> {
    pub adc: B::Adc,
    pub mag: B::Mag,
    pub link: B::Link,
    /// Masks the link completion interrupt
    pub irq: B::Irq,
    pub clock: B::Clock,
    pub system: B::System,
}
