//! HTTP server module: request gates and router wiring.

mod gate;
mod server;

pub use gate::{
    endpoint_gate, global_ip_gate, principal_layer, sensitive_ip_gate, Authenticator,
    EndpointGate, GateRejection, GlobalIpGate, Principal, SensitiveIpGate,
};
pub use server::{build_router, DemoAuthenticator, HttpServer};
