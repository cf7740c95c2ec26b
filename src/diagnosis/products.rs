//! Product recommendations keyed on the predicted class
//!
//! [`recommended_products`] is the static table. [`parse_suggested_products`]
//! reads a model-written JSON array of products; callers fall back to the
//! table whenever it yields nothing.

use serde::{Deserialize, Serialize};

use crate::dataset::is_healthy_class;

const FUNGAL_KEYWORDS: [&str; 6] = ["scab", "rust", "mildew", "blight", "rot", "fungal"];
const PEST_KEYWORDS: [&str; 5] = ["pest", "insect", "aphid", "mite", "worm"];

/// Most products kept from a model suggestion
pub const MAX_SUGGESTED_PRODUCTS: usize = 3;

const IMAGE_FIELD: &str =
    "https://images.unsplash.com/photo-1592984337482-8fd1b5960c5c?w=400&h=300&fit=crop&crop=center";
const IMAGE_BOTTLE: &str =
    "https://images.unsplash.com/photo-1587049352846-4a222e784d38?w=400&h=300&fit=crop&crop=center";
const IMAGE_SPRAYER: &str =
    "https://images.unsplash.com/photo-1565396493583-56c918b442e6?w=400&h=300&fit=crop&crop=center";

/// A purchasable product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub price: String,
    pub image: String,
    pub purchase_url: String,
}

impl Product {
    fn new(name: &str, kind: &str, price: &str, image: &str, search: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            price: price.to_string(),
            image: image.to_string(),
            purchase_url: format!("https://www.amazon.in/s?k={}&ref=nb_sb_noss_2", search),
        }
    }
}

/// Stock picture for a product type
fn image_for_kind(kind: &str) -> &'static str {
    let kind = kind.to_lowercase();
    if kind.contains("equipment") || kind.contains("sprayer") {
        IMAGE_SPRAYER
    } else if kind.contains("fungicide") || kind.contains("pesticide") || kind.contains("organic") {
        IMAGE_BOTTLE
    } else {
        IMAGE_FIELD
    }
}

/// One entry of a model-written product list
#[derive(Debug, Deserialize)]
struct SuggestedProduct {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    purchase_url: String,
}

/// Products from a model reply containing a JSON array.
///
/// The array may be wrapped in prose or a code fence. Entries missing a
/// name, type or price are dropped, and at most
/// [`MAX_SUGGESTED_PRODUCTS`] are kept. `None` when nothing usable remains.
pub fn parse_suggested_products(text: &str) -> Option<Vec<Product>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }

    let suggested: Vec<SuggestedProduct> = serde_json::from_str(&text[start..=end]).ok()?;
    let products: Vec<Product> = suggested
        .into_iter()
        .filter(|p| !p.name.trim().is_empty() && !p.kind.trim().is_empty() && !p.price.trim().is_empty())
        .take(MAX_SUGGESTED_PRODUCTS)
        .map(|p| {
            let search = p.name.trim().replace(' ', "+").to_lowercase();
            let mut product = Product::new(p.name.trim(), p.kind.trim(), p.price.trim(), image_for_kind(&p.kind), &search);
            if p.purchase_url.starts_with("https://") {
                product.purchase_url = p.purchase_url;
            }
            product
        })
        .collect();

    if products.is_empty() {
        None
    } else {
        Some(products)
    }
}

fn nativo() -> Product {
    Product::new("Bayer Nativo 75 WG", "Fungicide", "₹850", IMAGE_FIELD, "bayer+nativo+75+wg+fungicide")
}

fn amistar() -> Product {
    Product::new("Syngenta Amistar Top", "Fungicide", "₹1200", IMAGE_BOTTLE, "syngenta+amistar+top+fungicide")
}

fn sprayer() -> Product {
    Product::new("KisanKraft Battery Sprayer", "Equipment", "₹3500", IMAGE_SPRAYER, "kisankraft+battery+sprayer")
}

fn manik(kind: &str, image: &str) -> Product {
    Product::new("Tata Rallis Manik", kind, "₹380", image, "tata+rallis+manik+insecticide")
}

/// Products for the predicted class: preventive for healthy leaves, otherwise
/// chosen by fungal or pest keywords in the class name
pub fn recommended_products(class_name: &str) -> Vec<Product> {
    if is_healthy_class(class_name) {
        return vec![
            Product::new("Iffco Nano Urea", "Preventive", "₹240", IMAGE_FIELD, "iffco+nano+urea"),
            Product::new("Organic Neem Oil", "Preventive", "₹350", IMAGE_BOTTLE, "organic+neem+oil+agriculture"),
        ];
    }

    let name = class_name.to_lowercase();
    if FUNGAL_KEYWORDS.iter().any(|k| name.contains(k)) {
        return vec![nativo(), amistar(), sprayer()];
    }
    if PEST_KEYWORDS.iter().any(|k| name.contains(k)) {
        return vec![
            Product::new("Bayer Confidor", "Pesticide", "₹450", IMAGE_BOTTLE, "bayer+confidor+insecticide"),
            manik("Pesticide", IMAGE_FIELD),
            sprayer(),
        ];
    }
    vec![nativo(), manik("Treatment", IMAGE_BOTTLE), amistar()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_gets_preventive_products() {
        let products = recommended_products("Apple___healthy");
        assert_eq!(products.len(), 2);
        assert!(products.iter().all(|p| p.kind == "Preventive"));
    }

    #[test]
    fn test_keyword_tables() {
        let fungal = recommended_products("Potato___Late_blight");
        assert_eq!(fungal[0].name, "Bayer Nativo 75 WG");
        assert_eq!(fungal[2].kind, "Equipment");

        let pest = recommended_products("Tomato___Spider_mites Two-spotted_spider_mite");
        assert_eq!(pest[0].name, "Bayer Confidor");

        let other = recommended_products("Tomato___Leaf_Mold");
        assert_eq!(other[1].kind, "Treatment");
    }

    #[test]
    fn test_parse_suggested_products() {
        let reply = r#"Here you go:
```json
[
  {"name": "Dhanuka M-45", "type": "Fungicide", "price": "₹420", "purchase_url": "https://www.amazon.in/s?k=dhanuka+m45"},
  {"name": "Neem Gold", "type": "Organic Solution", "price": "₹300"},
  {"name": "", "type": "Fungicide", "price": "₹100"},
  {"name": "KisanKraft Knapsack", "type": "Equipment", "price": "₹2800"},
  {"name": "Extra", "type": "Bio-fertilizer", "price": "₹150"}
]
```"#;
        let products = parse_suggested_products(reply).unwrap();
        assert_eq!(products.len(), 3);
        assert_eq!(products[0].purchase_url, "https://www.amazon.in/s?k=dhanuka+m45");
        assert!(products[1].purchase_url.contains("neem+gold"));
        assert_eq!(products[2].name, "KisanKraft Knapsack");
        assert_eq!(products[2].image, IMAGE_SPRAYER);
    }

    #[test]
    fn test_unusable_suggestions() {
        assert!(parse_suggested_products("no list here").is_none());
        assert!(parse_suggested_products("[not json]").is_none());
        assert!(parse_suggested_products("[]").is_none());
        assert!(parse_suggested_products(r#"[{"name": "Only a name"}]"#).is_none());
    }

    #[test]
    fn test_product_serializes_kind_as_type() {
        let json = serde_json::to_value(recommended_products("Apple___healthy")).unwrap();
        assert_eq!(json[0]["type"], "Preventive");
        assert!(json[0]["purchase_url"].as_str().unwrap().starts_with("https://www.amazon.in/s?k="));
    }
}
