/// Data layer: core types, persistence, attribute resolution and selection.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv        instrument hierarchy
///        │                              │
///        ▼                              ▼
///   ┌──────────┐                  ┌──────────┐
///   │  loader   │  records        │  import   │  flatten sweeps
///   └──────────┘                  └──────────┘
///        │                              │
///        ▼                              ▼
///   ┌──────────────┐
///   │  SeriesStore  │  Vec<Series>, add / overwrite / delete
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐   ┌─────────┐
///   │ resolver  │ ← │  range   │  episode text → index set
///   └──────────┘   └─────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  episode / group / name predicates → indices
///   └──────────┘
/// ```

pub mod filter;
pub mod import;
pub mod loader;
pub mod model;
pub mod range;
pub mod resolver;
pub mod store;
