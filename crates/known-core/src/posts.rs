use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{KnownError, Result};
use crate::frontmatter;

/// A post as it leaves a source: the raw markdown text plus the slug parsed
/// out of its front matter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPost {
    pub slug: String,
    pub text: String,
}

impl RawPost {
    /// Build from raw text, reading the slug out of the front matter.
    pub fn from_text(text: String) -> Result<Self> {
        let parsed = frontmatter::parse(&text)?;
        Ok(RawPost {
            slug: parsed.front_matter.slug,
            text,
        })
    }
}

/// Shared preview-mode switch. While enabled, sources that carry draft
/// content serve it alongside published posts; clearing returns every
/// reader to published-only.
#[derive(Clone, Debug, Default)]
pub struct PreviewMode(Arc<AtomicBool>);

impl PreviewMode {
    pub fn new() -> Self {
        PreviewMode::default()
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A provider of raw posts. Sources are queried uniformly; the aggregation
/// layer neither knows nor cares whether text came from disk or a CMS.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn list(&self) -> Result<Vec<RawPost>>;

    async fn get(&self, slug: &str) -> Result<Option<RawPost>>;
}

/// Posts stored as markdown files in a configured directory.
pub struct FsPostSource {
    dir: PathBuf,
}

impl FsPostSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FsPostSource { dir: dir.into() }
    }

    fn io_err(&self, err: std::io::Error) -> KnownError {
        KnownError::Persistence(format!("posts dir {}: {}", self.dir.display(), err))
    }
}

#[async_trait]
impl PostSource for FsPostSource {
    async fn list(&self) -> Result<Vec<RawPost>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| self.io_err(e))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.io_err(e))? {
            let file_type = entry.file_type().await.map_err(|e| self.io_err(e))?;
            if file_type.is_file() {
                paths.push(entry.path());
            }
        }
        // Directory enumeration order is platform-dependent; sort for a
        // deterministic concatenation (and thus deterministic tie-breaks).
        paths.sort();

        let mut posts = Vec::with_capacity(paths.len());
        for path in paths {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| self.io_err(e))?;
            posts.push(RawPost::from_text(text)?);
        }
        debug!(dir = %self.dir.display(), count = posts.len(), "listed filesystem posts");
        Ok(posts)
    }

    async fn get(&self, slug: &str) -> Result<Option<RawPost>> {
        Ok(self.list().await?.into_iter().find(|p| p.slug == slug))
    }
}

fn parse_blocks<I, S>(blocks: I) -> Result<Vec<RawPost>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    blocks
        .into_iter()
        .map(|block| RawPost::from_text(block.into()))
        .collect()
}

/// Posts already materialized as raw text blocks, e.g. CMS content bundled
/// at build time. Draft blocks are only served while preview mode is on.
pub struct StaticPostSource {
    published: Vec<RawPost>,
    drafts: Vec<RawPost>,
    preview: PreviewMode,
}

impl StaticPostSource {
    pub fn from_blocks<I, S>(blocks: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(StaticPostSource {
            published: parse_blocks(blocks)?,
            drafts: Vec::new(),
            preview: PreviewMode::new(),
        })
    }

    pub fn with_drafts<I, J, S, T>(published: I, drafts: J, preview: PreviewMode) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Ok(StaticPostSource {
            published: parse_blocks(published)?,
            drafts: parse_blocks(drafts)?,
            preview,
        })
    }
}

#[async_trait]
impl PostSource for StaticPostSource {
    async fn list(&self) -> Result<Vec<RawPost>> {
        let mut posts = self.published.clone();
        if self.preview.is_enabled() {
            posts.extend(self.drafts.iter().cloned());
        }
        Ok(posts)
    }

    async fn get(&self, slug: &str) -> Result<Option<RawPost>> {
        Ok(self.list().await?.into_iter().find(|p| p.slug == slug))
    }
}

/// The CMS feed: published posts plus drafts that only surface in preview
/// mode. Each entry is raw markdown carrying the shared front matter header.
#[derive(Debug, Deserialize)]
struct CmsFeed {
    published: Vec<String>,
    #[serde(default)]
    draft: Vec<String>,
}

/// CMS posts fetched over HTTP at startup.
pub struct CmsPostSource {
    inner: StaticPostSource,
}

impl CmsPostSource {
    pub async fn fetch(url: &str, preview: PreviewMode) -> Result<Self> {
        let cms_err = |err: reqwest::Error| KnownError::Persistence(format!("cms {}: {}", url, err));
        let feed: CmsFeed = reqwest::Client::new()
            .get(url)
            .send()
            .await
            .map_err(cms_err)?
            .error_for_status()
            .map_err(cms_err)?
            .json()
            .await
            .map_err(cms_err)?;
        debug!(
            url,
            published = feed.published.len(),
            draft = feed.draft.len(),
            "fetched cms posts"
        );
        Ok(CmsPostSource {
            inner: StaticPostSource::with_drafts(feed.published, feed.draft, preview)?,
        })
    }
}

#[async_trait]
impl PostSource for CmsPostSource {
    async fn list(&self) -> Result<Vec<RawPost>> {
        self.inner.list().await
    }

    async fn get(&self, slug: &str) -> Result<Option<RawPost>> {
        self.inner.get(slug).await
    }
}

/// Queries registered sources in priority order. `list` concatenates in
/// registration order; `get` returns the first hit, so an earlier source
/// shadows a later one on a shared slug.
pub struct CompositeSource {
    sources: Vec<Arc<dyn PostSource>>,
}

impl CompositeSource {
    pub fn new(sources: Vec<Arc<dyn PostSource>>) -> Self {
        CompositeSource { sources }
    }
}

#[async_trait]
impl PostSource for CompositeSource {
    async fn list(&self) -> Result<Vec<RawPost>> {
        let mut all = Vec::new();
        for source in &self.sources {
            all.extend(source.list().await?);
        }
        Ok(all)
    }

    async fn get(&self, slug: &str) -> Result<Option<RawPost>> {
        for source in &self.sources {
            if let Some(post) = source.get(slug).await? {
                return Ok(Some(post));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn raw_post(slug: &str, published_on: &str, body: &str) -> String {
        format!(
            "---\ntitle: {slug}\nsummary: about {slug}\npublishedOn: {published_on}\nslug: {slug}\n---\n{body}\n"
        )
    }

    fn temp_posts_dir(posts: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in posts {
            let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
            file.write_all(text.as_bytes()).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn fs_source_lists_every_file() {
        let dir = temp_posts_dir(&[
            ("a.md", &raw_post("alpha", "2021-01-01", "a")),
            ("b.md", &raw_post("beta", "2021-02-01", "b")),
        ]);
        let source = FsPostSource::new(dir.path());
        let posts = source.list().await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].slug, "alpha");
        assert_eq!(posts[1].slug, "beta");
    }

    #[tokio::test]
    async fn fs_source_get_finds_by_slug() {
        let dir = temp_posts_dir(&[("a.md", &raw_post("alpha", "2021-01-01", "a"))]);
        let source = FsPostSource::new(dir.path());
        assert!(source.get("alpha").await.unwrap().is_some());
        assert!(source.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_source_missing_dir_is_persistence_error() {
        let source = FsPostSource::new("/definitely/not/here");
        let err = source.list().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn fs_source_malformed_post_is_front_matter_error() {
        let dir = temp_posts_dir(&[("bad.md", "no header at all")]);
        let source = FsPostSource::new(dir.path());
        let err = source.list().await.unwrap_err();
        assert!(matches!(err, KnownError::FrontMatter(_)));
    }

    #[tokio::test]
    async fn static_source_round_trips_blocks() {
        let source =
            StaticPostSource::from_blocks(vec![raw_post("cms-one", "2021-02-01", "x")]).unwrap();
        let posts = source.list().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].slug, "cms-one");
    }

    #[tokio::test]
    async fn drafts_are_hidden_until_preview_is_enabled() {
        let preview = PreviewMode::new();
        let source = StaticPostSource::with_drafts(
            vec![raw_post("live", "2021-01-01", "x")],
            vec![raw_post("wip", "2021-02-01", "y")],
            preview.clone(),
        )
        .unwrap();

        let slugs: Vec<String> = source
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.slug)
            .collect();
        assert_eq!(slugs, vec!["live"]);
        assert!(source.get("wip").await.unwrap().is_none());

        preview.enable();
        let slugs: Vec<String> = source
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.slug)
            .collect();
        assert_eq!(slugs, vec!["live", "wip"]);
        assert!(source.get("wip").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clearing_preview_hides_drafts_again() {
        let preview = PreviewMode::new();
        let source = StaticPostSource::with_drafts(
            Vec::<String>::new(),
            vec![raw_post("wip", "2021-02-01", "y")],
            preview.clone(),
        )
        .unwrap();

        preview.enable();
        assert_eq!(source.list().await.unwrap().len(), 1);

        preview.clear();
        assert!(source.list().await.unwrap().is_empty());
        assert!(source.get("wip").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn composite_concatenates_in_registration_order() {
        let fs_like =
            StaticPostSource::from_blocks(vec![raw_post("from-fs", "2021-01-01", "x")]).unwrap();
        let cms_like =
            StaticPostSource::from_blocks(vec![raw_post("from-cms", "2021-02-01", "y")]).unwrap();
        let composite = CompositeSource::new(vec![Arc::new(fs_like), Arc::new(cms_like)]);

        let slugs: Vec<String> = composite
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.slug)
            .collect();
        assert_eq!(slugs, vec!["from-fs", "from-cms"]);
    }

    #[tokio::test]
    async fn composite_get_prefers_the_earlier_source() {
        let first =
            StaticPostSource::from_blocks(vec![raw_post("shared", "2021-01-01", "first wins")])
                .unwrap();
        let second =
            StaticPostSource::from_blocks(vec![raw_post("shared", "2021-02-01", "shadowed")])
                .unwrap();
        let composite = CompositeSource::new(vec![Arc::new(first), Arc::new(second)]);

        let post = composite.get("shared").await.unwrap().unwrap();
        assert!(post.text.contains("first wins"));
    }

    #[tokio::test]
    async fn composite_get_falls_through_to_later_sources() {
        let first = StaticPostSource::from_blocks(Vec::<String>::new()).unwrap();
        let second =
            StaticPostSource::from_blocks(vec![raw_post("only-here", "2021-02-01", "y")]).unwrap();
        let composite = CompositeSource::new(vec![Arc::new(first), Arc::new(second)]);

        assert!(composite.get("only-here").await.unwrap().is_some());
        assert!(composite.get("nowhere").await.unwrap().is_none());
    }
}
