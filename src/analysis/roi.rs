// ---------------------------------------------------------------------------
// Regions of interest on the x axis
// ---------------------------------------------------------------------------

/// An inclusive x interval.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOfInterest {
    pub xmin: f64,
    pub xmax: f64,
    pub visible: bool,
    pub name: String,
}

impl RegionOfInterest {
    /// Bounds may be given in either order.
    pub fn new(a: f64, b: f64) -> Self {
        RegionOfInterest {
            xmin: a.min(b),
            xmax: a.max(b),
            visible: true,
            name: String::new(),
        }
    }

    pub fn contains_value(&self, x: f64) -> bool {
        x >= self.xmin && x <= self.xmax
    }

    /// Per-sample membership mask.
    pub fn contains(&self, x: &[f64]) -> Vec<bool> {
        x.iter().map(|&v| self.contains_value(v)).collect()
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.xmin + self.xmax)
    }

    /// Samples of `(x, y)` inside this region.
    pub fn restrict(&self, x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        x.iter()
            .zip(y)
            .filter(|(xi, _)| self.contains_value(**xi))
            .map(|(xi, yi)| (*xi, *yi))
            .unzip()
    }
}

/// Ordered list of regions. Cloning gives the immutable snapshot a fit or
/// measurement works from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionOfInterestSet {
    rois: Vec<RegionOfInterest>,
}

impl RegionOfInterestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, xmin: f64, xmax: f64) -> usize {
        self.push(RegionOfInterest::new(xmin, xmax))
    }

    pub fn push(&mut self, roi: RegionOfInterest) -> usize {
        self.rois.push(roi);
        self.rois.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Option<RegionOfInterest> {
        (index < self.rois.len()).then(|| self.rois.remove(index))
    }

    pub fn clear(&mut self) {
        self.rois.clear();
    }

    /// Returns `false` if `index` is out of range.
    pub fn set_visible(&mut self, index: usize, visible: bool) -> bool {
        match self.rois.get_mut(index) {
            Some(roi) => {
                roi.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn show_all(&mut self) {
        self.rois.iter_mut().for_each(|r| r.visible = true);
    }

    pub fn hide_all(&mut self) {
        self.rois.iter_mut().for_each(|r| r.visible = false);
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RegionOfInterest> {
        self.rois.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionOfInterest> {
        self.rois.iter()
    }

    /// Regions that take part in restriction.
    pub fn qualifying(&self, use_visible_only: bool) -> impl Iterator<Item = &RegionOfInterest> {
        self.rois
            .iter()
            .filter(move |r| r.visible || !use_visible_only)
    }

    /// Union mask over qualifying regions, or `None` when no region qualifies
    /// (meaning: no restriction).
    pub fn mask(&self, x: &[f64], use_visible_only: bool) -> Option<Vec<bool>> {
        let rois: Vec<&RegionOfInterest> = self.qualifying(use_visible_only).collect();
        if rois.is_empty() {
            return None;
        }
        Some(
            x.iter()
                .map(|&v| rois.iter().any(|r| r.contains_value(v)))
                .collect(),
        )
    }

    /// Samples inside the union of qualifying regions. With no qualifying
    /// region the input comes back unchanged.
    pub fn restrict(&self, x: &[f64], y: &[f64], use_visible_only: bool) -> (Vec<f64>, Vec<f64>) {
        match self.mask(x, use_visible_only) {
            None => (x.to_vec(), y.to_vec()),
            Some(mask) => x
                .iter()
                .zip(y)
                .zip(mask)
                .filter(|(_, inside)| *inside)
                .map(|((xi, yi), _)| (*xi, *yi))
                .unzip(),
        }
    }
}
