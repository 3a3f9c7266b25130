pub mod bootstrap;
pub mod chain;
pub mod context;
pub mod errors;
pub mod filters;
pub mod middleware;
pub mod observability;
pub mod routing;
