use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EntityKind, KnownError, Result};
use crate::frontmatter::{self, FrontMatter, ParsedPost};
use crate::posts::{CompositeSource, PostSource, PreviewMode};

/// How detail pages outside the warmed slug set are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrerenderPolicy {
    /// The warmed set is the complete universe; unknown slugs are a hard 404.
    Complete,
    /// The warmed set is a starting point; unknown slugs are resolved on
    /// first request and cached thereafter.
    Partial,
}

/// Aggregates and serves blog posts from the composite source.
///
/// The index is recomputed per call; resolved detail pages are cached in
/// `rendered`, which doubles as the pre-rendered slug set after `warm`.
pub struct BlogIndex {
    source: CompositeSource,
    policy: PrerenderPolicy,
    rendered: DashMap<String, ParsedPost>,
    preview: PreviewMode,
}

impl BlogIndex {
    pub fn new(source: CompositeSource, policy: PrerenderPolicy) -> Self {
        BlogIndex {
            source,
            policy,
            rendered: DashMap::new(),
            preview: PreviewMode::new(),
        }
    }

    /// Share the preview switch with the sources. While preview is on,
    /// detail pages bypass the pre-render cache entirely so draft content
    /// is never cached past a preview session.
    pub fn with_preview(mut self, preview: PreviewMode) -> Self {
        self.preview = preview;
        self
    }

    pub fn policy(&self) -> PrerenderPolicy {
        self.policy
    }

    /// All post metadata from every source, `publishedOn` descending.
    /// Ties are broken by slug ascending, a deliberate secondary key rather
    /// than incidental sort stability.
    pub async fn aggregate(&self) -> Result<Vec<FrontMatter>> {
        let raw = self.source.list().await?;
        let mut metas = Vec::with_capacity(raw.len());
        for post in &raw {
            metas.push(frontmatter::parse(&post.text)?.front_matter);
        }
        metas.sort_by(|a, b| {
            publish_date(&b.published_on)
                .cmp(&publish_date(&a.published_on))
                .then_with(|| b.published_on.cmp(&a.published_on))
                .then_with(|| a.slug.cmp(&b.slug))
        });
        debug!(count = metas.len(), "aggregated posts");
        Ok(metas)
    }

    /// Pre-render every slug currently known to the sources. The resulting
    /// cache is the fixed set under `Complete` and the seed set under
    /// `Partial`.
    pub async fn warm(&self) -> Result<usize> {
        self.rendered.clear();
        for post in self.source.list().await? {
            // First occurrence wins so a shared slug keeps the priority
            // source's content, matching `resolve`.
            if !self.rendered.contains_key(&post.slug) {
                self.rendered
                    .insert(post.slug.clone(), frontmatter::parse(&post.text)?);
            }
        }
        Ok(self.rendered.len())
    }

    /// Serve a detail page under the configured policy. Cache hits are
    /// returned as-is; a miss either resolves on demand (`Partial`) or is a
    /// hard not-found (`Complete`).
    pub async fn render(&self, slug: &str) -> Result<ParsedPost> {
        if self.preview.is_enabled() {
            return self.resolve(slug).await;
        }
        if let Some(hit) = self.rendered.get(slug) {
            return Ok(hit.clone());
        }
        match self.policy {
            PrerenderPolicy::Complete => {
                Err(KnownError::not_found(EntityKind::Post, slug))
            }
            PrerenderPolicy::Partial => {
                warn!(slug, "slug not pre-rendered, resolving on demand");
                let post = self.resolve(slug).await?;
                self.rendered.insert(slug.to_string(), post.clone());
                Ok(post)
            }
        }
    }

    /// Resolve a slug straight through the sources, bypassing the cache.
    pub async fn resolve(&self, slug: &str) -> Result<ParsedPost> {
        let raw = self
            .source
            .get(slug)
            .await?
            .ok_or_else(|| KnownError::not_found(EntityKind::Post, slug))?;
        frontmatter::parse(&raw.text)
    }
}

fn publish_date(published_on: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(published_on.get(..10)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::{FsPostSource, StaticPostSource};
    use std::sync::Arc;

    fn raw_post(slug: &str, published_on: &str) -> String {
        format!(
            "---\ntitle: {slug}\nsummary: about {slug}\npublishedOn: {published_on}\nslug: {slug}\n---\nbody of {slug}\n"
        )
    }

    fn static_source(posts: &[(&str, &str)]) -> Arc<dyn PostSource> {
        let blocks: Vec<String> = posts
            .iter()
            .map(|(slug, date)| raw_post(slug, date))
            .collect();
        Arc::new(StaticPostSource::from_blocks(blocks).unwrap())
    }

    fn index_of(
        fs_posts: &[(&str, &str)],
        cms_posts: &[(&str, &str)],
        policy: PrerenderPolicy,
    ) -> BlogIndex {
        let composite =
            CompositeSource::new(vec![static_source(fs_posts), static_source(cms_posts)]);
        BlogIndex::new(composite, policy)
    }

    #[tokio::test]
    async fn aggregate_sorts_across_sources_newest_first() {
        let index = index_of(
            &[("jan", "2021-01-01"), ("mar", "2021-03-01")],
            &[("feb", "2021-02-01")],
            PrerenderPolicy::Complete,
        );
        let slugs: Vec<String> = index
            .aggregate()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.slug)
            .collect();
        assert_eq!(slugs, vec!["mar", "feb", "jan"]);
    }

    #[tokio::test]
    async fn aggregate_breaks_date_ties_by_slug() {
        let index = index_of(
            &[("zebra", "2021-01-01")],
            &[("apple", "2021-01-01")],
            PrerenderPolicy::Complete,
        );
        let slugs: Vec<String> = index
            .aggregate()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.slug)
            .collect();
        // "zebra" comes first in concatenation order but loses the tie-break.
        assert_eq!(slugs, vec!["apple", "zebra"]);
    }

    #[tokio::test]
    async fn undated_posts_sort_last() {
        let index = index_of(
            &[("dated", "2021-01-01")],
            &[("undated", "someday")],
            PrerenderPolicy::Complete,
        );
        let slugs: Vec<String> = index
            .aggregate()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.slug)
            .collect();
        assert_eq!(slugs, vec!["dated", "undated"]);
    }

    #[tokio::test]
    async fn resolve_prefers_filesystem_over_cms() {
        let index = index_of(
            &[("shared", "2021-01-01")],
            &[("shared", "2021-02-01")],
            PrerenderPolicy::Complete,
        );
        let post = index.resolve("shared").await.unwrap();
        assert_eq!(post.front_matter.published_on, "2021-01-01");
    }

    #[tokio::test]
    async fn resolve_unknown_slug_is_not_found() {
        let index = index_of(&[], &[], PrerenderPolicy::Partial);
        let err = index.resolve("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            KnownError::NotFound {
                kind: EntityKind::Post,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn complete_policy_hard_404s_outside_the_warmed_set() {
        let index = index_of(
            &[("early", "2021-01-01")],
            &[("late", "2021-02-01")],
            PrerenderPolicy::Complete,
        );
        index.warm().await.unwrap();
        assert!(index.render("early").await.is_ok());

        // Not in the warmed set: hard 404 even though a source could, in
        // principle, be re-queried.
        let composite = CompositeSource::new(vec![static_source(&[("early", "2021-01-01")])]);
        let narrow = BlogIndex::new(composite, PrerenderPolicy::Complete);
        // warm() never saw "late", and Complete never goes back to a source.
        narrow.warm().await.unwrap();
        let err = narrow.render("late").await.unwrap_err();
        assert!(matches!(err, KnownError::NotFound { .. }));
    }

    #[tokio::test]
    async fn partial_policy_resolves_unknown_slugs_on_demand() {
        let index = index_of(
            &[("early", "2021-01-01")],
            &[("late", "2021-02-01")],
            PrerenderPolicy::Partial,
        );
        // No warm: nothing is cached yet.
        let post = index.render("late").await.unwrap();
        assert_eq!(post.front_matter.slug, "late");
    }

    #[tokio::test]
    async fn partial_policy_caches_after_first_request() {
        // Back the index by the filesystem so the source can disappear
        // underneath it.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.md"), raw_post("cached", "2021-01-01")).unwrap();
        let composite =
            CompositeSource::new(vec![Arc::new(FsPostSource::new(dir.path().to_path_buf()))]);
        let index = BlogIndex::new(composite, PrerenderPolicy::Partial);

        index.render("cached").await.unwrap();
        std::fs::remove_file(dir.path().join("p.md")).unwrap();

        // Second request is served from the cache, not the (now empty) dir.
        assert!(index.render("cached").await.is_ok());
    }

    #[tokio::test]
    async fn preview_drafts_join_the_aggregate_until_cleared() {
        let preview = PreviewMode::new();
        let cms = StaticPostSource::with_drafts(
            vec![raw_post("live", "2021-01-01")],
            vec![raw_post("wip", "2021-02-01")],
            preview.clone(),
        )
        .unwrap();
        let index = BlogIndex::new(
            CompositeSource::new(vec![Arc::new(cms)]),
            PrerenderPolicy::Partial,
        )
        .with_preview(preview.clone());

        preview.enable();
        let slugs: Vec<String> = index
            .aggregate()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.slug)
            .collect();
        assert_eq!(slugs, vec!["wip", "live"]);

        preview.clear();
        let slugs: Vec<String> = index
            .aggregate()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.slug)
            .collect();
        assert_eq!(slugs, vec!["live"]);
    }

    #[tokio::test]
    async fn preview_renders_are_never_cached() {
        let preview = PreviewMode::new();
        let cms = StaticPostSource::with_drafts(
            Vec::<String>::new(),
            vec![raw_post("wip", "2021-02-01")],
            preview.clone(),
        )
        .unwrap();
        let index = BlogIndex::new(
            CompositeSource::new(vec![Arc::new(cms)]),
            PrerenderPolicy::Partial,
        )
        .with_preview(preview.clone());

        preview.enable();
        assert!(index.render("wip").await.is_ok());

        // Clearing preview must also drop the draft from detail pages, even
        // under the lazily-caching partial policy.
        preview.clear();
        let err = index.render("wip").await.unwrap_err();
        assert!(matches!(err, KnownError::NotFound { .. }));
    }

    #[tokio::test]
    async fn warm_keeps_the_priority_source_on_a_shared_slug() {
        let index = index_of(
            &[("shared", "2021-01-01")],
            &[("shared", "2021-02-01")],
            PrerenderPolicy::Complete,
        );
        index.warm().await.unwrap();
        let post = index.render("shared").await.unwrap();
        assert_eq!(post.front_matter.published_on, "2021-01-01");
    }

    #[tokio::test]
    async fn warm_reports_the_pre_rendered_count() {
        let index = index_of(
            &[("a", "2021-01-01")],
            &[("b", "2021-02-01")],
            PrerenderPolicy::Complete,
        );
        assert_eq!(index.warm().await.unwrap(), 2);
    }
}
