use std::collections::HashMap;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::app::context::Context;
use crate::app::model::PostText;
use crate::engine::ForumEngine;
use crate::error::{Error, Result};

/// Site-specific parsing for one forum engine.
pub trait ExtractionStrategy: Send + Sync {
    fn engine(&self) -> ForumEngine;

    /// Thread links of a listing page in document order, absolute against
    /// the scheme and host of `base`. Call again to restart.
    fn extract_links<'a>(
        &'a self,
        listing: &'a Html,
        base: &Url,
    ) -> Box<dyn Iterator<Item = Url> + 'a>;

    fn extract_post(&self, thread: &Html) -> PostText;
}

pub struct XenForo {
    thread_title: Selector,
    post_body: Selector,
    page_title: Selector,
    message: Selector,
    post_time: Selector,
}

impl XenForo {
    pub fn new() -> Self {
        Self {
            thread_title: selector("div.structItem-title a"),
            post_body: selector("div.bbWrapper"),
            page_title: selector("h1.p-title-value"),
            message: selector("article.message"),
            post_time: selector("time.u-dt"),
        }
    }
}

impl Default for XenForo {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for XenForo {
    fn engine(&self) -> ForumEngine {
        ForumEngine::XenForo
    }

    fn extract_links<'a>(
        &'a self,
        listing: &'a Html,
        base: &Url,
    ) -> Box<dyn Iterator<Item = Url> + 'a> {
        let origin = base.origin().ascii_serialization();
        Box::new(
            listing
                .select(&self.thread_title)
                .filter_map(|anchor| anchor.value().attr("href"))
                .filter_map(move |href| {
                    let start = href.find("/threads/")?;
                    Url::parse(&format!("{origin}{}", &href[start..])).ok()
                }),
        )
    }

    fn extract_post(&self, thread: &Html) -> PostText {
        let body = thread
            .select(&self.post_body)
            .map(|block| element_text(&block))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        let title = thread
            .select(&self.page_title)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();
        let author = thread
            .select(&self.message)
            .find_map(|el| el.value().attr("data-author"))
            .unwrap_or_default()
            .trim()
            .to_owned();
        let date = thread
            .select(&self.post_time)
            .find_map(|el| el.value().attr("datetime"))
            .unwrap_or_default()
            .to_owned();

        PostText {
            title,
            body,
            author,
            date,
        }
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("invalid built-in selector {css:?}: {err}"))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_owned()
}

/// Engine name → strategy, filled once at startup.
#[derive(Clone, Default)]
pub struct StrategyTable {
    strategies: HashMap<ForumEngine, Arc<dyn ExtractionStrategy>>,
}

impl StrategyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        table.register(Arc::new(XenForo::new()));
        table
    }

    pub fn register(&mut self, strategy: Arc<dyn ExtractionStrategy>) {
        self.strategies.insert(strategy.engine(), strategy);
    }

    pub fn resolve(&self, engine: ForumEngine) -> Result<Arc<dyn ExtractionStrategy>> {
        self.strategies
            .get(&engine)
            .cloned()
            .ok_or(Error::UnsupportedEngine(engine))
    }

    pub fn engines(&self) -> Vec<ForumEngine> {
        let mut engines: Vec<_> = self.strategies.keys().copied().collect();
        engines.sort_by_key(|engine| engine.as_str());
        engines
    }
}

/// Parses `html` and collects its thread links.
pub fn thread_links(strategy: &dyn ExtractionStrategy, html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    strategy.extract_links(&document, base).collect()
}

pub fn post_text(strategy: &dyn ExtractionStrategy, html: &str) -> PostText {
    let document = Html::parse_document(html);
    strategy.extract_post(&document)
}

/// Turns a target's stored landing document into pending work items.
///
/// Returns the number of thread links found, including ones already known.
pub async fn extract_for_target(ctx: &Context, target_id: &str) -> Result<usize> {
    let target = ctx
        .store
        .get_target(target_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("target {target_id}")))?;

    let Some(location) = target.document_location.as_deref() else {
        tracing::error!(target_id, url = %target.url, "no fetched document for target");
        return Err(Error::MissingArtifact {
            target_id: target_id.to_owned(),
        });
    };
    let engine = target.engine.unwrap_or(ForumEngine::Unknown);
    let strategy = ctx.strategies.resolve(engine).inspect_err(|_| {
        tracing::error!(target_id, %engine, "engine is not supported");
    })?;

    let html = ctx
        .artifacts
        .read_document(location)
        .await
        .map_err(Error::Artifact)?;
    let base = Url::parse(&target.url)
        .map_err(|err| Error::Parse(format!("target url {}: {err}", target.url)))?;

    let (links, landing) = {
        let document = Html::parse_document(&html);
        let links: Vec<Url> = strategy.extract_links(&document, &base).collect();
        (links, strategy.extract_post(&document))
    };

    let urls: Vec<String> = links.iter().map(Url::to_string).collect();
    let inserted = ctx.store.insert_work_items(target_id, &urls).await?;
    tracing::info!(
        target_id,
        %engine,
        found = links.len(),
        inserted,
        landing_chars = landing.body.len(),
        "extracted thread links"
    );

    Ok(links.len())
}

#[cfg(test)]
mod tests {
    use scraper::Html;
    use url::Url;

    use super::{ExtractionStrategy, StrategyTable, XenForo, post_text, thread_links};
    use crate::engine::ForumEngine;
    use crate::error::Error;

    const LISTING: &str = r#"<html id="XF"><body>
      <div class="structItem-title">
        <a href="/forums/market.4/?prefix_id=2" class="labelLink">Selling</a>
        <a href="/threads/fresh-combo-list.101/">Fresh combo list</a>
      </div>
      <div class="structItem-title">
        <a href="https://mirror.onion/community/threads/rdp-access.102/">RDP access</a>
      </div>
      <a href="/threads/outside-marker.103/">not in a title block</a>
    </body></html>"#;

    #[test]
    fn links_are_filtered_and_rebased() {
        let base = Url::parse("https://example.onion/forum").unwrap();
        let links = thread_links(&XenForo::new(), LISTING, &base);
        let links: Vec<String> = links.iter().map(Url::to_string).collect();
        assert_eq!(
            links,
            vec![
                "https://example.onion/threads/fresh-combo-list.101/",
                "https://example.onion/threads/rdp-access.102/",
            ]
        );
    }

    #[test]
    fn base_port_is_kept() {
        let base = Url::parse("http://127.0.0.1:8080/forum/").unwrap();
        let links = thread_links(&XenForo::new(), LISTING, &base);
        assert_eq!(
            links[0].as_str(),
            "http://127.0.0.1:8080/threads/fresh-combo-list.101/"
        );
    }

    #[test]
    fn link_sequence_restarts() {
        let strategy = XenForo::new();
        let document = Html::parse_document(LISTING);
        let base = Url::parse("https://example.onion/").unwrap();
        let first: Vec<Url> = strategy.extract_links(&document, &base).collect();
        let second: Vec<Url> = strategy.extract_links(&document, &base).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn post_blocks_are_trimmed_and_joined() {
        let html = r#"<html><body>
          <h1 class="p-title-value"> Selling access </h1>
          <article class="message" data-author="n0body">
            <time class="u-dt" datetime="2024-05-01T10:00:00+0000">May 1</time>
            <div class="bbWrapper">
              First post body
            </div>
          </article>
          <article class="message" data-author="other">
            <div class="bbWrapper">  reply  </div>
          </article>
        </body></html>"#;
        let post = post_text(&XenForo::new(), html);
        assert_eq!(post.body, "First post body\n\nreply");
        assert_eq!(post.title, "Selling access");
        assert_eq!(post.author, "n0body");
        assert_eq!(post.date, "2024-05-01T10:00:00+0000");
    }

    #[test]
    fn page_without_posts_is_empty() {
        let post = post_text(&XenForo::new(), "<html><body><p>nothing</p></body></html>");
        assert!(post.body.is_empty());
        assert!(post.author.is_empty());
    }

    #[test]
    fn unknown_engine_resolves_to_unsupported() {
        let table = StrategyTable::with_defaults();
        assert!(table.resolve(ForumEngine::XenForo).is_ok());
        match table.resolve(ForumEngine::MyBb) {
            Err(Error::UnsupportedEngine(engine)) => assert_eq!(engine, ForumEngine::MyBb),
            other => panic!("expected unsupported engine, got {:?}", other.map(|s| s.engine())),
        }
        assert_eq!(table.engines(), vec![ForumEngine::XenForo]);
    }
}
