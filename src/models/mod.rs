pub mod anthropic;
pub mod feature;
pub mod run;
pub mod stream_event;

pub use anthropic::{Message, MessageContent, MessagesRequest, MessagesResponse, ToolUse, Usage};
pub use feature::{
    all_features, find_feature, FeatureDescriptor, RunnableFeature, SubFeature, AVAILABLE_MODELS,
};
pub use run::{ConfigStatus, ConfigureRequest, RunRequest, UploadResponse};
pub use stream_event::{
    CacheMetrics, ComparisonMetrics, ComparisonRow, EventKind, FilePayload, MessagePayload,
    MetricsPayload, StreamEvent, TokenPayload,
};
