//! Diagnosis module
//!
//! Turns a [`PredictionResult`] into the response shown to growers: a
//! readable label, severity, description, care suggestions and products.

pub mod labels;
pub mod products;

use serde::{Deserialize, Serialize};

pub use labels::{describe, format_label, suggestions, Severity};
pub use products::{parse_suggested_products, recommended_products, Product, MAX_SUGGESTED_PRODUCTS};

use crate::inference::PredictionResult;

/// Body of a successful analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Readable label, e.g. `Apple Scab (Apple)`
    pub disease: String,
    /// Catalog class name the label was built from
    pub class_name: String,
    /// Integer percent
    pub confidence: u32,
    pub severity: Severity,
    pub description: String,
    pub suggestions: Vec<String>,
    pub products: Vec<Product>,
}

impl Diagnosis {
    pub fn from_prediction(prediction: &PredictionResult) -> Self {
        let class_name = prediction.class_name.as_str();
        Self {
            disease: format_label(class_name),
            class_name: class_name.to_string(),
            confidence: (prediction.confidence.clamp(0.0, 1.0) * 100.0).round() as u32,
            severity: Severity::assess(class_name, prediction.confidence),
            description: describe(class_name).to_string(),
            suggestions: suggestions(class_name).into_iter().map(str::to_string).collect(),
            products: recommended_products(class_name),
        }
    }

    /// Replace the static product table with another recommendation
    pub fn with_products(mut self, products: Vec<Product>) -> Self {
        self.products = products;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ClassCatalog;
    use crate::inference::{select_class, FilterPolicy};

    #[test]
    fn test_from_prediction() {
        let catalog = ClassCatalog::from_names(vec!["Apple___Apple_scab".into(), "Apple___healthy".into()]);
        let prediction = select_class(&[0.876, 0.124], &catalog, None, FilterPolicy::default()).unwrap();

        let diagnosis = Diagnosis::from_prediction(&prediction);
        assert_eq!(diagnosis.disease, "Apple Scab (Apple)");
        assert_eq!(diagnosis.confidence, 88);
        assert_eq!(diagnosis.severity, Severity::High);
        assert_eq!(diagnosis.suggestions.len(), 5);
        assert_eq!(diagnosis.products.len(), 3);

        let json = serde_json::to_value(&diagnosis).unwrap();
        assert_eq!(json["severity"], "high");
    }
}
