//! Workflows embedded in the binary

const ORDER_FULFILLMENT: &str = include_str!("../../workflows/order_fulfillment.toml");
const EXPENSE_CLAIM: &str = include_str!("../../workflows/expense_claim.toml");
const AUTOMOTIVE_SALES: &str = include_str!("../../workflows/automotive_sales.toml");

const BUILTINS: &[(&str, &str)] = &[
    ("order_fulfillment", ORDER_FULFILLMENT),
    ("expense_claim", EXPENSE_CLAIM),
    ("automotive_sales", AUTOMOTIVE_SALES),
];

/// Source of a built-in workflow by name
pub fn get(name: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, source)| *source)
}

/// All built-in workflows as `(name, source)` pairs
pub fn all() -> impl Iterator<Item = (&'static str, &'static str)> {
    BUILTINS.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Topology, WorkflowConfig};

    fn parse(name: &str) -> WorkflowConfig {
        let workflow: WorkflowConfig = toml::from_str(get(name).unwrap()).unwrap();
        assert_eq!(workflow.name, name);
        workflow.validate().unwrap();
        workflow
    }

    #[test]
    fn test_order_fulfillment_shape() {
        let workflow = parse("order_fulfillment");
        let ids: Vec<_> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["intake", "inventory", "approval", "warehouse", "shipping"]);
        assert!(workflow.steps[2].checkpoint);
        assert_eq!(workflow.steps.iter().filter(|s| s.checkpoint).count(), 1);
    }

    #[test]
    fn test_expense_claim_has_conditional_checkpoint() {
        let workflow = parse("expense_claim");
        let checkpoints: Vec<_> = workflow.steps.iter().filter(|s| s.checkpoint).collect();
        assert_eq!(checkpoints.len(), 2);
        assert!(checkpoints[0].checkpoint_if.is_some());
        assert!(checkpoints[1].checkpoint_if.is_none());
    }

    #[test]
    fn test_automotive_sales_specialists() {
        let workflow = parse("automotive_sales");
        assert_eq!(workflow.topology, Topology::Supervisor);
        assert_eq!(workflow.specialists.len(), 5);
        let finance = workflow.specialists.iter().find(|s| s.id == "finance").unwrap();
        assert_eq!(finance.agent.as_deref(), Some("Finance Specialist"));
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(get("payroll").is_none());
        assert_eq!(all().count(), 3);
    }
}
