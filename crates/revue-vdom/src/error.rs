use thiserror::Error;

/// Misuse the runtime recovers from; routed through `revue_core::warn`.
#[derive(Debug, Clone, Error)]
pub enum UsageError {
    #[error("missing required prop `{prop}` on {component}")]
    MissingProp { component: String, prop: String },

    #[error("data of {component} must be an object, got {found}")]
    DataNotObject { component: String, found: String },

    #[error("{component} has no render function")]
    NoRender { component: String },

    #[error("props are owned by the parent; `{key}` on {component} was not written")]
    PropWrite { component: String, key: String },
}

pub(crate) fn report(err: UsageError) {
    revue_core::warn(err.to_string());
}
