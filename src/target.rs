//! Target post-processing.
//!
//! Transformations applied to the raw model output: label remapping to
//! display values, min/max clipping, rescaling, integer casts, and filling
//! the probability map from declared prior probabilities.

use crate::model::InternalScore;
use crate::predicate::required_attribute;
use crate::schema::MiningFunction;
use crate::xml::Element;

/// Integer cast mode for regression outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastInteger {
    Round,
    Ceiling,
    Floor,
}

impl CastInteger {
    fn from_name(name: &str) -> Option<CastInteger> {
        match name {
            "round" => Some(CastInteger::Round),
            "ceiling" => Some(CastInteger::Ceiling),
            "floor" => Some(CastInteger::Floor),
            _ => None,
        }
    }

    fn apply(self, value: f64) -> f64 {
        match self {
            CastInteger::Round => value.round(),
            CastInteger::Ceiling => value.ceil(),
            CastInteger::Floor => value.floor(),
        }
    }
}

/// One declared target category.
#[derive(Debug, Clone)]
pub struct TargetValue {
    pub value: String,
    pub display_value: Option<String>,
    pub prior_probability: Option<f64>,
    pub default_value: Option<f64>,
}

impl TargetValue {
    fn parse(element: &Element) -> crate::error::Result<TargetValue> {
        Ok(TargetValue {
            value: required_attribute(element, "value")?.to_string(),
            display_value: element.attribute("displayValue").map(str::to_string),
            prior_probability: element.double_attribute("priorProbability"),
            default_value: element.double_attribute("defaultValue"),
        })
    }
}

/// The post-score transformation of one model element.
#[derive(Debug, Clone, Default)]
pub struct Target {
    mining_function: Option<MiningFunction>,
    pub field: Option<String>,
    cast: Option<CastInteger>,
    min: Option<f64>,
    max: Option<f64>,
    rescale_factor: Option<f64>,
    rescale_constant: Option<f64>,
    values: Vec<TargetValue>,
}

impl Target {
    /// Parse the `Target` child of a `Targets` element; absent targets are
    /// the identity transformation.
    pub fn parse(
        element: Option<&Element>,
        mining_function: MiningFunction,
    ) -> crate::error::Result<Target> {
        let Some(element) = element else {
            return Ok(Target::default());
        };

        let mut values = Vec::new();
        for value_element in element.children("TargetValue") {
            values.push(TargetValue::parse(value_element)?);
        }

        Ok(Target {
            mining_function: Some(mining_function),
            field: element.attribute("field").map(str::to_string),
            cast: element
                .attribute("castInteger")
                .and_then(CastInteger::from_name),
            min: element.double_attribute("min"),
            max: element.double_attribute("max"),
            rescale_factor: element.double_attribute("rescaleFactor"),
            rescale_constant: element.double_attribute("rescaleConstant"),
            values,
        })
    }

    /// Transform a full score in place.
    pub fn apply(&self, score: &mut InternalScore) {
        match self.mining_function {
            None => {}
            Some(MiningFunction::Regression) => {
                if score.empty {
                    if let Some(default) = self.values.first().and_then(|value| value.default_value)
                    {
                        score.double_score = default;
                        score.score = format_number(default);
                        score.empty = false;
                    }
                } else {
                    score.double_score = self.rescale(score.double_score);
                    score.score = format_number(score.double_score);
                }
            }
            Some(MiningFunction::Classification) => {
                for target_value in &self.values {
                    if let Some(display) = &target_value.display_value {
                        if score.score == target_value.value {
                            score.score = display.clone();
                            if let Ok(number) = display.parse() {
                                score.double_score = number;
                            }
                        }
                        // rename the probability key to the display value
                        if let Some(probability) = score.probabilities.remove(&target_value.value) {
                            score.probabilities.insert(display.clone(), probability);
                        }
                    }
                    let key = target_value
                        .display_value
                        .clone()
                        .unwrap_or_else(|| target_value.value.clone());
                    if !score.probabilities.contains_key(&key) {
                        score
                            .probabilities
                            .insert(key, target_value.prior_probability.unwrap_or(0.0));
                    }
                }
            }
        }
    }

    /// Transform a bare predicted label (the fast path).
    pub fn apply_label(&self, label: &str) -> String {
        match self.mining_function {
            None => label.to_string(),
            Some(MiningFunction::Classification) => {
                for target_value in &self.values {
                    if label == target_value.value {
                        if let Some(display) = &target_value.display_value {
                            return display.clone();
                        }
                    }
                }
                label.to_string()
            }
            Some(MiningFunction::Regression) => {
                if label.is_empty() {
                    return self
                        .values
                        .first()
                        .and_then(|value| value.default_value)
                        .map(format_number)
                        .unwrap_or_default();
                }
                match label.parse::<f64>() {
                    Ok(number) => format_number(self.rescale(number)),
                    Err(_) => label.to_string(),
                }
            }
        }
    }

    fn rescale(&self, raw: f64) -> f64 {
        let mut value = raw;
        if let Some(min) = self.min {
            if value < min {
                value = min;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                value = max;
            }
        }
        if let Some(factor) = self.rescale_factor {
            value *= factor;
        }
        if let Some(constant) = self.rescale_constant {
            value += constant;
        }
        if let Some(cast) = self.cast {
            value = cast.apply(value);
        }
        value
    }
}

/// Canonical string form of a numeric score.
pub(crate) fn format_number(value: f64) -> String {
    value.to_string()
}
