pub mod config;
pub mod discovery;
pub mod errors;
pub mod export;
pub mod import;
pub mod logging;
pub mod metadata;
pub mod pose;
pub mod project;
pub mod schema;
pub mod table;
pub mod value;
pub mod writer;

pub use config::ProjectConfig;
pub use discovery::{discover_videos, DiscoveredVideo, VideoExtensions};
pub use errors::{
    ConfigError, DiscoveryError, EditError, ExportError, FieldIssue, FieldProblem, ImportError,
    ProjectLoadError, SchemaError, ValidationError, WriteError,
};
pub use export::export_table;
pub use import::{import_spreadsheet, ImportReport, SkipReason, SkippedRow};
pub use logging::{init_logging, LogFormat};
pub use metadata::{
    reconcile_metadata, MetadataWarning, ReconciledMetadata, SidecarConvention, SidecarLocator,
};
pub use pose::{match_pose_results, ModelIds, PoseResultConvention, PoseResults};
pub use project::Project;
pub use schema::{FieldKind, FieldSpec, Schema};
pub use table::{build_project_table, ProjectTable, TableSources, VideoRecord};
pub use value::{FieldValue, Metadata};
pub use writer::{validate_metadata, write_metadata};
