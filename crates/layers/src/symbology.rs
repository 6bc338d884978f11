/// Presentation attributes of a leaf layer.
///
/// Scale bounds are scale denominators; `None` means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerStyle {
    pub style: Option<String>,
    pub scale_min: Option<f64>,
    pub scale_max: Option<f64>,
    pub legend_url: Option<String>,
}

impl LayerStyle {
    pub fn new(style: Option<String>, scale_min: Option<f64>, scale_max: Option<f64>) -> Self {
        Self {
            style,
            scale_min,
            scale_max,
            legend_url: None,
        }
    }
}
