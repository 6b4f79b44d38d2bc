pub mod cache;
pub mod compiler;
pub mod result;
pub mod validator;

pub use cache::{CacheStats, ValidationCache};
pub use compiler::{CompileOptions, CompilerInvoker, GraphvizCompiler, WarningPolicy};
pub use result::{ValidationResult, VerificationStatus};
pub use validator::{BatchOptions, ValidateOptions, Validator};
