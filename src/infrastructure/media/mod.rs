//! Media router seam
//!
//! The orchestrator attaches one remote audio stream per active leg and is
//! the only component that ever attaches or detaches a sink.

use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::LegId;
use async_trait::async_trait;
use tracing::debug;

/// Attaches/detaches a leg's remote audio to an output sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaRouter: Send + Sync {
    async fn attach(&self, leg_id: &LegId) -> Result<()>;
    async fn detach(&self, leg_id: &LegId) -> Result<()>;
}

/// Media router that only logs; used by the demo binary where no audio
/// subsystem is wired in.
pub struct NullMediaRouter;

#[async_trait]
impl MediaRouter for NullMediaRouter {
    async fn attach(&self, leg_id: &LegId) -> Result<()> {
        debug!("media attach (noop) for leg {}", leg_id);
        Ok(())
    }

    async fn detach(&self, leg_id: &LegId) -> Result<()> {
        debug!("media detach (noop) for leg {}", leg_id);
        Ok(())
    }
}
