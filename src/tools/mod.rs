pub mod code;
pub mod executor;
pub mod formatter;
pub mod rag;
pub mod registry;
pub mod sandbox;
pub mod schema;
pub mod search;
pub mod tracker;
pub mod validator;

pub use code::PythonInterpreterTool;
pub use executor::{normalize_args, ToolExecutor};
pub use formatter::StructuredFormatterTool;
pub use rag::CourseKnowledgeSearchTool;
pub use registry::{Tool, ToolManifestEntry, ToolRegistry};
pub use sandbox::{PythonSandbox, SandboxError};
pub use schema::ArtifactKind;
pub use search::{GoogleSearchTool, SearchCredentials};
pub use tracker::LearningTrackerTool;
pub use validator::SolutionValidatorTool;
