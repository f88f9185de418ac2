//! cms-config — exporter configuration.
//!
//! The configuration object handed to the exporter core: one credential
//! per cloud account and, per monitoring namespace, the list of metrics to
//! poll together with optional instance claims.
//!
//! ```yaml
//! credentials:
//!   prod:
//!     accessKey: LTAI...
//!     accessKeySecret: ...
//!     region: cn-shanghai
//! metrics:
//!   acs_ecs_dashboard:
//!     - name: CPUUtilization
//!       period: "60"
//!       measure: Average
//!       dimensions: [instanceId]
//!       spec:
//!         claim:
//!           - instance: [i-1, i-2]
//!             app: web
//!             team: infra
//! ```

pub mod config;
pub mod error;

pub use config::{Claim, Config, Credential, MetricSpec, Spec};
pub use error::{ConfigError, ConfigResult};
