pub mod cycle;
pub mod error;
pub mod interceptor;
pub mod message;
pub mod pipeline;
pub mod reply_future;
pub mod tick;

pub use cycle::{Immediate, UpdateCycle};
pub use error::SparError;
pub use interceptor::{
    FulfillHook, Interceptor, InterceptorFactory, InterceptorRegistry, InterceptorSource,
    RejectHook,
};
pub use message::{is_truthy, Method, Params, Reply, RequestDescriptor};
pub use pipeline::{Chain, CoreExecutor, InterceptorPipeline, Step};
pub use reply_future::{ReplyFuture, ReplyResult};
pub use tick::DeferredDispatch;
