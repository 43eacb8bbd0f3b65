use serde::{Deserialize, Serialize};
use tracing::warn;

const DIETS_JSON: &str = include_str!("../data/diets.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietPlan {
    pub name: String,
    pub description: String,
    pub audience: String,
    pub how_to: String,
    pub pros: String,
    pub cons: String,
    pub advice: String,
}

/// The bundled diet plans, in display order.
#[must_use]
pub fn all() -> Vec<DietPlan> {
    serde_json::from_str(DIETS_JSON).unwrap_or_else(|e| {
        warn!("bundled diet plans failed to parse: {e}");
        Vec::new()
    })
}

#[must_use]
pub fn find(name: &str) -> Option<DietPlan> {
    let name = name.trim();
    all().into_iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_plans_bundled() {
        let plans = all();
        assert_eq!(plans.len(), 10);
        assert_eq!(plans[0].name, "地中海飲食");
        assert!(plans.iter().all(|p| !p.how_to.is_empty()));
    }

    #[test]
    fn find_by_name() {
        let keto = find("生酮飲食").unwrap();
        assert!(!keto.cons.is_empty());
        assert!(find("不存在的飲食").is_none());
    }
}
