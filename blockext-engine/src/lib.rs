pub mod bounds;
pub mod command;
pub mod oriented;
pub mod scene;
pub mod visibility;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("no entity is selected")]
        NoSelection,
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
        #[error("selected entity is not a block reference")]
        NotABlockReference,
        #[error("block definition {0} not found")]
        DefinitionNotFound(u32),
        #[error("block `{name}` references itself")]
        CyclicReference { name: String },
        #[error("block nesting exceeds {limit} levels")]
        DepthLimitExceeded { limit: usize },
    }
}

