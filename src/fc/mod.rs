pub mod detector;
pub mod parser;
pub mod prompt;

mod postprocess;
mod preprocess;
mod softcall;

pub use detector::{DetectorOutput, DetectorState, SoftCallDetector};
pub use parser::{parse_tool_call_block, render_tool_call, ParsedToolCall};
pub use postprocess::{finalize_parts, resolve_finish_reason};
pub use preprocess::{build_softcall_history, rewrite_content};
pub use softcall::SoftCallModel;
