//! Plugin HTTP routes.

pub mod pattern;
pub mod registry;

pub use pattern::RoutePattern;
pub use registry::{
    ResolvedRoute, RouteBody, RouteEntry, RouteHandler, RouteInfo, RouteRegistry, RouteRequest,
    RouteResponse,
};
