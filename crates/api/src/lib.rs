//! scaler-api: REST client for the autoscaler backend
//!
//! Authentication, cluster management and the metrics / scaling-event
//! queries that accompany the live stream.

pub mod client;
pub mod error;
pub mod range;
pub mod session;
pub mod types;

pub use client::{ApiClient, DEFAULT_API_URL};
pub use error::{ApiError, ParseTimeRangeError};
pub use range::{RangeParams, TimeRange};
pub use session::{Credentials, Session};
pub use types::{
    Cluster, ClusterConfig, ClusterSpec, ClusterState, ClusterStatus, LatestMetric,
    LoginResponse, RegisterResponse, ServerCounts, ServerMetric,
};
