//! Coordination primitives shared by the edge gateway and business services.
//! - `store`: atomic key-value primitives over Redis or process memory.
//! - `lock`: distributed mutual exclusion with owner-checked release.
//! - `auth`: bearer token verification and the resulting identity.
//! - `balancer` / `discovery`: backend instance selection over a candidate set.

pub mod auth;
pub mod balancer;
pub mod discovery;
pub mod lock;
pub mod store;
