use super::message::{LinkRequest, LinkResponse};
use hal::InterruptControl;

/// State of the link layer as seen from the foreground loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No buffers bound yet
    Stopped,
    /// Buffers bound, handshake with the peer in progress
    LinkNegotiated,
    /// Waiting for the user to hand over a receive buffer
    Idle,
    /// A complete request is waiting in the receive buffer
    Busy,
    /// A transfer is in flight
    Transient,
}

/// Link layer driver, framing and completion interrupts live below this
pub trait LinkTransport {
    fn state(&self) -> LinkState;

    /// Bind the link-level transmit/receive buffer pair
    fn bind_buffers(&mut self);

    /// Hand the user receive buffer to the link
    fn arm_receive(&mut self);

    /// Decoded content of the receive buffer, valid in `Busy`
    fn request(&self) -> LinkRequest;

    /// Queue a response for the next transfer
    fn set_response(&mut self, response: LinkResponse);

    /// Tell the link the user side is finished with its buffers
    fn done(&mut self);
}

/// Masks the link interrupt for as long as it lives
pub struct IrqGuard<'a, I: InterruptControl> {
    irq: &'a mut I,
}

impl<'a, I: InterruptControl> IrqGuard<'a, I> {
    pub fn new(irq: &'a mut I) -> Self {
        irq.disable();
        IrqGuard { irq }
    }
}

impl<I: InterruptControl> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        self.irq.enable();
    }
}

/// Advance the handshake one step. Returns the pending request when the
/// link is `Busy`.
pub fn poll_link<L: LinkTransport, I: InterruptControl>(
    link: &mut L,
    irq: &mut I,
) -> Option<LinkRequest> {
    let _guard = IrqGuard::new(irq);
    match link.state() {
        LinkState::Busy => Some(link.request()),
        LinkState::Idle => {
            link.arm_receive();
            link.done();
            None
        }
        LinkState::Stopped => {
            link.bind_buffers();
            None
        }
        LinkState::LinkNegotiated | LinkState::Transient => None,
    }
}

/// Requeue the receive buffer after a request was handled
pub fn rearm_link<L: LinkTransport, I: InterruptControl>(link: &mut L, irq: &mut I) {
    let _guard = IrqGuard::new(irq);
    link.arm_receive();
    link.done();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockIrq, MockLink};

    #[test]
    fn test_guard_restores_on_every_path() {
        let mut irq = MockIrq::default();

        fn early_return(irq: &mut MockIrq, bail: bool) -> u32 {
            let _guard = IrqGuard::new(irq);
            if bail {
                return 1;
            }
            2
        }

        assert_eq!(early_return(&mut irq, true), 1);
        assert_eq!(early_return(&mut irq, false), 2);
        assert_eq!(irq.depth(), 0, "interrupt must be unmasked after the guard");
        assert_eq!(irq.disable_count(), 2);
        assert_eq!(irq.max_depth(), 1);
    }

    #[test]
    fn test_handshake_sequence() {
        let mut link = MockLink::new();
        let mut irq = MockIrq::default();

        assert_eq!(poll_link(&mut link, &mut irq), None);
        assert_eq!(link.state(), LinkState::LinkNegotiated, "stopped link binds buffers");

        assert_eq!(poll_link(&mut link, &mut irq), None, "no dispatch while negotiating");
        link.interrupt();
        assert_eq!(link.state(), LinkState::Idle);

        assert_eq!(poll_link(&mut link, &mut irq), None);
        assert!(link.is_armed(), "idle link gets a receive buffer");
        assert_eq!(link.done_count(), 1);
        assert_eq!(link.state(), LinkState::Transient);

        link.push_request(LinkRequest::SerialQuery);
        link.interrupt();
        assert_eq!(poll_link(&mut link, &mut irq), Some(LinkRequest::SerialQuery));
        assert_eq!(irq.depth(), 0);
    }

    #[test]
    fn test_rearm_signals_done() {
        let mut link = MockLink::connected();
        let mut irq = MockIrq::default();
        link.push_request(LinkRequest::Unknown(0x7f));
        link.interrupt();
        assert!(!link.is_armed());

        rearm_link(&mut link, &mut irq);
        assert!(link.is_armed());
        assert_eq!(link.state(), LinkState::Transient);
        assert_eq!(irq.depth(), 0);
    }
}
