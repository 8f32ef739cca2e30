//! 实时核心
//!
//! 组件依赖自下而上：注册表与订阅索引是叶子；在线状态从注册表派生；
//! 广播器依赖注册表 + 订阅索引；路由器与连接生命周期依赖以上全部。

pub mod broadcaster;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod router;
pub mod shard;
pub mod subscriptions;
pub mod typing;

pub use broadcaster::Broadcaster;
pub use hub::RealtimeHub;
pub use presence::PresenceTracker;
pub use registry::{AddOutcome, ConnectionRegistry, RemoveOutcome};
pub use router::EventRouter;
pub use subscriptions::SubscriptionIndex;
pub use typing::TypingTracker;
