//! Native-host bindings for proxy/stub registration.

pub mod api;
