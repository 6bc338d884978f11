/// Axis-aligned 2D bounds, used as a layer extent (`[min_x, min_y]` .. `[max_x, max_y]`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Aabb2 {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Aabb2 { min, max }
    }

    /// Builds bounds from a flat `[min_x, min_y, max_x, max_y]` slice.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [min_x, min_y, max_x, max_y] => Some(Self::new([*min_x, *min_y], [*max_x, *max_y])),
            _ => None,
        }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.min[0], self.min[1], self.max[0], self.max[1]]
    }
}

#[cfg(test)]
mod tests {
    use super::Aabb2;

    #[test]
    fn from_slice_requires_four_values() {
        let b = Aabb2::from_slice(&[1.0, 2.0, 3.0, 4.0]).expect("bounds");
        assert_eq!(b.to_array(), [1.0, 2.0, 3.0, 4.0]);
        assert!(Aabb2::from_slice(&[1.0, 2.0]).is_none());
    }
}
