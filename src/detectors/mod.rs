//! Confirmation detectors
//!
//! Each detector answers one question about the bars it is given and returns
//! `None` when the answer is no.
//!
//! # Stages
//!
//! - **Swing / sweep**: liquidity taken beyond the latest swing
//! - **HTF FVG**: higher-timeframe gap delivered in the sweep's direction
//! - **iFVG**: lower-timeframe gap inverted by the latest close
//! - **CISD**: close through the origin of the pre-sweep delivery run
//! - **Momentum** (optional): rate of change, EMA side and HTF trend agree

pub mod cisd;
pub mod fvg;
pub mod helpers;
pub mod ifvg;
pub mod momentum;
pub mod swing;

pub use cisd::*;
pub use fvg::*;
pub use helpers::*;
pub use ifvg::*;
pub use momentum::*;
pub use swing::*;
