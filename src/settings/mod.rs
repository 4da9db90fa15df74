pub mod apply;
pub mod area;
pub mod condition;
pub mod falloff;
pub mod operation;

pub use apply::{
    ApplyMode,
    ApplyRule,
    ChannelPaint,
    ColorApplication,
    PaintLimit,
    PhysicsSurfacePaint,
    SurfacePaint,
};
pub use area::{AreaComponent, AreaShape, PaintArea};
pub use condition::{
    Condition,
    ConditionFallback,
    ConditionKind,
    ConditionSet,
    HeightComparison,
};
pub use falloff::{FalloffKind, FalloffSample, FalloffSettings};
pub use operation::{
    CallbackSettings,
    ColorOverrideHook,
    DebugSettings,
    FundamentalSettings,
    LineOfSightHook,
    LodSelection,
    OperationDescriptor,
    OperationKind,
    PropagationSettings,
    RandomVertices,
};
