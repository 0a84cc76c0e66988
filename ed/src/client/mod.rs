//! Publisher/subscriber client library
//!
//! Thin wrappers over the proxy's ingress and egress sockets. Delivery is
//! best effort: a subscriber learns about lost events only through gaps in a
//! publisher's sequence numbers, reported as [`Received::missed`].

mod publisher;
mod subscriber;

pub use publisher::Publisher;
pub use subscriber::{Received, Subscriber};
