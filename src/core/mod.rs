pub mod auth;
pub mod backend_routing;
pub mod cors;
pub mod gateway;
pub mod httppattern;
pub mod router;
pub mod service_control;

pub use gateway::{GatewayError, GatewayService, GatewaySnapshot, RouteDecision};
pub use httppattern::{Bindings, ParseError, PathMatcher, Template};
pub use router::{RejectedRule, RouteTable};
