//! One grammar per log family.

pub mod g1;
pub mod go;
pub mod hpux;
pub mod ibm;
pub mod ibm_j9;
pub mod jrockit;
pub mod shenandoah;
pub mod sun;
pub mod sun_legacy;
pub mod unified;

pub use g1::G1Grammar;
pub use go::GoGrammar;
pub use hpux::HpUxGrammar;
pub use ibm::IbmGrammar;
pub use ibm_j9::IbmJ9Grammar;
pub use jrockit::JRockitGrammar;
pub use shenandoah::ShenandoahGrammar;
pub use sun::SunGrammar;
pub use sun_legacy::SunLegacyGrammar;
pub use unified::UnifiedGrammar;
