//! Access to the controller under test
//!
//! The engine only ever talks to a [`Device`]. Two implementations ship with
//! the crate: [`SimulatedDevice`] keeps points in memory (dry runs, tests) and
//! [`GatewayDevice`] drives an external protocol gateway process.

pub mod codec;
pub mod gateway;
pub mod protocol;
pub mod simulated;

use async_trait::async_trait;

use crate::common::Result;
use crate::points::PointValue;

pub use gateway::GatewayDevice;
pub use simulated::SimulatedDevice;

/// Point-level access to a controller
///
/// Calls are never time-boxed by the engine; implementations that talk to
/// real hardware are expected to apply their own timeouts.
#[async_trait]
pub trait Device: Send {
    /// Read the present value of a point
    async fn read(&mut self, point: &str) -> Result<PointValue>;

    /// Write the present value of a point
    ///
    /// A rejected write must surface as [`crate::common::Error::DeviceWrite`].
    async fn write(&mut self, point: &str, value: &PointValue) -> Result<()>;

    /// Release the connection. Default: nothing to release.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<D: Device + ?Sized> Device for Box<D> {
    async fn read(&mut self, point: &str) -> Result<PointValue> {
        (**self).read(point).await
    }

    async fn write(&mut self, point: &str, value: &PointValue) -> Result<()> {
        (**self).write(point, value).await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}
