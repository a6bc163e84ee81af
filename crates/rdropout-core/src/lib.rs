//! 固定小数点ストリーミング正則化コア
//!
//! 固定小数点の活性化ベクトルをチャンク単位で受け取り、推論時ドロップアウト
//! （または Masksembles）を適用して、受け取った順序のまま出力する。
//!
//! ```text
//! producer ─→ StreamingRegularizer / EnsembleMasker ─→ consumer
//!                 │
//!                 ├─ MaskPolicy（Identity / ReluGated / BernoulliDropout / PrecomputedMaskDropout）
//!                 └─ FixedPointRng（パスごとのサブストリーム）
//! ```

pub mod config;
pub mod ensemble;
pub mod error;
pub mod fixed;
pub mod policy;
pub mod regularizer;
pub mod rng;
pub mod stream;

pub use config::{ChunkLayout, EnsembleConfig, RegularizerConfig};
pub use ensemble::{EnsembleMasker, MaskTable};
pub use error::{ConfigError, RegularizerError, RegularizerResult};
pub use fixed::{FixedPoint, Fixed16, Fixed32, KeepRate, RescaleFactor};
pub use policy::{Decision, DropoutRule, MaskPolicy, PolicyKind};
pub use regularizer::{PassState, StreamingRegularizer};
pub use rng::FixedPointRng;
pub use stream::{ChunkSink, ChunkSource, Disconnected, PassSummary, SliceSink, SliceSource};
