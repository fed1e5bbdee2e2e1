//! routemap core library: static extraction of HTTP endpoint inventories.
//!
//! A corpus of Python and JavaScript/TypeScript source units goes through a
//! per-unit front end (line classification, statement reconstruction, idiom
//! interpreters) and a corpus-wide back end (composition resolution, inventory
//! building). Nothing here executes, imports, or type-checks the analyzed code.

pub mod cache;
pub mod compose;
pub mod config;
pub mod corpus;
pub mod errors;
pub mod extract;
pub mod idioms;
pub mod inventory;
pub mod models;
pub mod pipeline;
pub mod scanner;

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

pub use cache::{analyze_incremental, UnitCache};
pub use config::AnalyzerConfig;
pub use corpus::load_corpus;
pub use errors::{RouteMapError, RouteMapResult};
pub use extract::UnitAnalysis;
pub use inventory::Inventory;
pub use models::{
    Category, CompositionNode, Diagnostic, Endpoint, EndpointFragment, HttpMethod, Issue,
    Language, Metadata, PathParam, SourceLocation, SourceUnit,
};
pub use pipeline::{analyze, analyze_unit, analyze_with, resolve, Analysis, CancellationToken};
