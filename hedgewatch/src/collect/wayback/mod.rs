pub mod wayback_collect;

pub use wayback_collect::TileProvider;
#[cfg(feature = "reqwest")]
pub use wayback_collect::WaybackCollect;
