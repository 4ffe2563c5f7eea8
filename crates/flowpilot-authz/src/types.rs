/// `context.delegation`, attached by pipeline step 5 when the resource has
/// an owner distinct from the principal. Absent (never populated) when
/// `principal_id == owner_id`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DelegationBlock {
    pub delegation_chain: Vec<String>,
    pub delegated_actions: Vec<String>,
}

impl DelegationBlock {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            delegation_chain: Vec::new(),
            delegated_actions: Vec::new(),
        }
    }
}
