//! Tool invocation: routing calls and normalizing their results.

mod result;
mod router;

pub use result::{ToolResult, ToolResultKind};
pub use router::{INVALID_FUNCTION_NAME, ToolRouter};
