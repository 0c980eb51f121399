//! Generation session: the collaborators and caches shared by one run
//!
//! A session binds one sheet, one item table and one property-type provider.
//! Its region, date and regex caches live exactly as long as the session.

use crate::config::GenerationConfig;
use crate::datetime::DateCache;
use crate::expr::{EntityRelations, EvaluationContext, ItemLookup, RegexCache};
use crate::provider::PropertyTypeProvider;
use crate::region::RegionCache;
use crate::sheet::Sheet;

pub struct Session<'a> {
    pub sheet: &'a dyn Sheet,
    pub items: &'a dyn ItemLookup,
    pub relations: Option<&'a dyn EntityRelations>,
    pub provider: &'a dyn PropertyTypeProvider,
    pub config: GenerationConfig,
    regions: RegionCache,
    dates: DateCache,
    regexes: RegexCache,
}

impl<'a> Session<'a> {
    pub fn new(
        sheet: &'a dyn Sheet,
        items: &'a dyn ItemLookup,
        provider: &'a dyn PropertyTypeProvider,
    ) -> Self {
        Self {
            sheet,
            items,
            relations: None,
            provider,
            config: GenerationConfig::default(),
            regions: RegionCache::new(),
            dates: DateCache::new(),
            regexes: RegexCache::new(),
        }
    }

    pub fn with_relations(mut self, relations: &'a dyn EntityRelations) -> Self {
        self.relations = Some(relations);
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Evaluation context with nothing bound but the session collaborators
    pub fn context(&self) -> EvaluationContext<'_> {
        let ctx = EvaluationContext::new(self.sheet, self.items)
            .with_n_bound(self.config.n_bound)
            .with_regex_cache(&self.regexes);
        match self.relations {
            Some(relations) => ctx.with_relations(relations),
            None => ctx,
        }
    }

    pub fn regions(&self) -> &RegionCache {
        &self.regions
    }

    pub fn dates(&self) -> &DateCache {
        &self.dates
    }
}
