pub mod executor;
pub mod rollback;

pub use executor::{ExecutionOutcome, OperationExecutor, PlannedMove};
pub use rollback::{
    render_json, render_shell, InverseOperation, RollbackDerivation, RollbackManager, RollbackPlan,
    RollbackReport,
};
