mod diagnostics;
mod load;
mod located;
mod validate;

pub use diagnostics::Diagnostic;
pub use diagnostics::Diagnostics;
pub use diagnostics::Error;
pub use diagnostics::FieldMessage;
pub use diagnostics::LoadError;
pub use diagnostics::SourceInfo;
pub use diagnostics::ValidationError;
pub use diagnostics::Warning;
pub use diagnostics::format_diagnostics;
pub use load::LoadableConfig;
pub use load::PartialConfig;
pub use load::load_partial;
pub use located::Located;
pub use validate::TryFromPartial;
pub use validate::Validate;
pub use validate::required;
pub use validate::unlocated_error;
