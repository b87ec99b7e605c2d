use bakery_core::{SaleDate, SalesmanId};

/// Filter describing which sale records to load from storage.
///
/// Date bounds are exclusive, which is what the cascade and the seed lookups
/// need. Results are ordered by date.
#[derive(Clone, Debug)]
pub struct SaleQuery {
    pub salesman: Option<SalesmanId>,
    pub after: Option<SaleDate>,
    pub before: Option<SaleDate>,
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl Default for SaleQuery {
    fn default() -> Self {
        Self {
            salesman: None,
            after: None,
            before: None,
            limit: None,
            ascending: true,
        }
    }
}

impl SaleQuery {
    pub fn for_salesman(salesman: &SalesmanId) -> Self {
        Self::default().with_salesman(salesman.clone())
    }

    pub fn with_salesman(mut self, salesman: SalesmanId) -> Self {
        self.salesman = Some(salesman);
        self
    }

    /// Only records dated strictly after `date`.
    pub fn after(mut self, date: SaleDate) -> Self {
        self.after = Some(date);
        self
    }

    /// Only records dated strictly before `date`.
    pub fn before(mut self, date: SaleDate) -> Self {
        self.before = Some(date);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub(crate) fn matches(&self, salesman: &SalesmanId, date: SaleDate) -> bool {
        self.salesman.as_ref().map_or(true, |wanted| wanted == salesman)
            && self.after.map_or(true, |bound| date > bound)
            && self.before.map_or(true, |bound| date < bound)
    }
}
