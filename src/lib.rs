//! # tsx-heal
//!
//! Compiles generated TSX components that are often slightly broken.
//!
//! ## Pipeline
//!
//! 1. **Parse** with layered recovery (`parse`).
//! 2. **Repair** with the auto-fixer (`autofix`) and the import normalizer
//!    (`normalize`). Each repair must re-parse or it is rolled back.
//! 3. **Resolve** imports through an ordered hook chain (`resolve`): in-memory
//!    modules first, then content-delivery URLs (`cdn`, `cache`).
//! 4. **Bundle** with oxc (`bundle`) and optionally wrap the module in an
//!    HTML document (`document`).
//!
//! [`Compiler`] drives the whole thing and returns a [`CompileResponse`].

pub mod autofix;
pub mod bundle;
pub mod cache;
pub mod cdn;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod edits;
pub mod icons;
pub mod imports;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod scope;
pub mod validate;


pub use bundle::{BundleEngine, BundleOptions, BundleOutput, OxcBundler};
pub use cdn::{CdnResolver, FetchError, HttpFetcher, PackageFetcher};
pub use config::{CompileOptions, CompilerConfig, JsxMode, ModuleFormat, OutputType, ResolveMode};
pub use pipeline::{
    AutoFixSummary, CompileRequest, CompileResponse, CompileStats, Compiler, RepairPipeline,
    RepairStage,
};
pub use report::{FixRecord, IssueKind, RepairReport, StageRecord};
pub use resolve::{HookChain, Resolution, ResolveHook};
pub use validate::{CompilerError, SourceLocation};

#[cfg(feature = "napi")]
pub use pipeline::compile_tsx_native;
