//! Human-readable labels, severity and care text for predicted classes

use serde::{Deserialize, Serialize};

use crate::dataset::{is_healthy_class, CLASS_SEPARATOR};

/// How urgent a prediction is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Healthy classes are always low; otherwise confidence decides
    pub fn assess(class_name: &str, confidence: f32) -> Self {
        if is_healthy_class(class_name) {
            Severity::Low
        } else if confidence >= 0.8 {
            Severity::High
        } else if confidence >= 0.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capitalise the first letter of every alphabetic run, lower-case the rest
pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn format_plant(plant: &str) -> String {
    let mut out = String::with_capacity(plant.len() + 2);
    for c in plant.replace('_', " ").chars() {
        if c == '(' && !out.ends_with(' ') {
            out.push(' ');
        }
        out.push(c);
    }
    out.trim().to_string()
}

/// `Apple___Apple_scab` -> `Apple Scab (Apple)`, `Apple___healthy` -> `Healthy (Apple)`
pub fn format_label(class_name: &str) -> String {
    let Some((plant, condition)) = class_name.split_once(CLASS_SEPARATOR) else {
        return title_case(&class_name.replace('_', " "));
    };

    let plant = format_plant(plant);
    let condition = condition.replace('_', " ");
    let condition = condition.trim();
    if condition.eq_ignore_ascii_case("healthy") {
        format!("Healthy ({})", plant)
    } else {
        format!("{} ({})", title_case(condition), plant)
    }
}

/// Short description of the predicted condition
pub fn describe(class_name: &str) -> &'static str {
    if is_healthy_class(class_name) {
        return "No significant disease detected. The leaf appears healthy. Continue regular monitoring and good cultural practices.";
    }

    let name = class_name.to_lowercase();
    if name.contains("scab") {
        "Leaf scab is a fungal disease causing dark, scaly lesions. It spreads in wet conditions and can reduce yield and fruit quality."
    } else if name.contains("rot") {
        "Rot disease causes decay and discoloration of tissue. Remove infected material and improve drainage and air circulation."
    } else if name.contains("rust") {
        "Rust is a fungal disease producing orange or brown pustules. It weakens plants and can defoliate if severe."
    } else if name.contains("mildew") || name.contains("powdery") {
        "Powdery mildew forms white fungal growth on leaves. It thrives in humid conditions; reduce humidity and improve airflow."
    } else if name.contains("blight") {
        "Blight causes rapid browning and wilting. Remove infected parts and avoid overhead watering."
    } else {
        "Leaf disease detected. Isolate affected plants, remove severely damaged leaves, and consider appropriate treatment based on the specific pathogen."
    }
}

/// Care suggestions for the predicted condition
pub fn suggestions(class_name: &str) -> Vec<&'static str> {
    if is_healthy_class(class_name) {
        return vec![
            "Continue regular monitoring of your plants",
            "Maintain good spacing and air circulation",
            "Avoid overhead watering to prevent future disease",
        ];
    }
    vec![
        "Remove and destroy infected leaves to reduce spread",
        "Apply an appropriate fungicide or treatment as recommended for the crop",
        "Improve air circulation and avoid wetting foliage when watering",
        "Avoid overhead watering; water at the base in the morning",
        "Monitor surrounding plants for early signs and treat if needed",
    ]
}
