use std::collections::HashSet;

use crossbeam_channel::Receiver;

use crate::api::{ApiError, FeedPage, FeedScope, Post, Tag};
use crate::data::FeedService;
use crate::tags::Enricher;

/// Page size the backend listing endpoints are called with.
pub const PAGE_SIZE: u32 = 10;

/// Slack for the near-bottom check, in the caller's scroll units.
pub const NEAR_BOTTOM_SLACK: f64 = 1.0;

/// A page fetch handed out by [`FeedController::begin_load`]. The fetch may
/// run anywhere (typically a worker thread); the outcome goes back through
/// [`FeedController::complete_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub scope: FeedScope,
    pub page: u32,
    pub limit: u32,
}

/// A post ready for display, with its tag set resolved.
#[derive(Debug, Clone)]
pub struct PostReady {
    pub post: Post,
    pub tags: Vec<Tag>,
}

/// A freshly appended post whose tag fetch is still outstanding. The post can
/// be shown right away; the tags arrive on the carried channel.
#[derive(Debug)]
pub struct PendingPost {
    pub post: Post,
    pub tags: Receiver<Vec<Tag>>,
}

impl PendingPost {
    /// Waits for the tag fetch. A dropped worker yields an empty set.
    pub fn resolve(self) -> PostReady {
        let tags = self.tags.recv().unwrap_or_default();
        PostReady {
            post: self.post,
            tags,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyFeed {
    /// The feed genuinely has no posts.
    NoPosts,
    /// A user-scoped feed was requested without a session.
    LoginRequired,
}

/// Drives pagination for one feed: owns the cursor, the set of already
/// rendered post ids, the terminal flag, and a single-slot in-flight guard.
/// Scroll events arrive far faster than pages load, so a trigger while a
/// fetch is outstanding is a no-op rather than a queued duplicate.
pub struct FeedController {
    scope: FeedScope,
    cursor: u32,
    terminal: bool,
    in_flight: bool,
    seen: HashSet<u64>,
    rendered: Vec<u64>,
}

impl FeedController {
    pub fn new(scope: FeedScope) -> Self {
        Self {
            scope,
            cursor: 0,
            terminal: false,
            in_flight: false,
            seen: HashSet::new(),
            rendered: Vec::new(),
        }
    }

    /// Resets to an empty feed at page zero, keeping the scope.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.terminal = false;
        self.in_flight = false;
        self.seen.clear();
        self.rendered.clear();
    }

    pub fn scope(&self) -> FeedScope {
        self.scope
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn rendered_count(&self) -> usize {
        self.rendered.len()
    }

    pub fn rendered_ids(&self) -> &[u64] {
        &self.rendered
    }

    /// Claims the next page fetch. Returns `None` when the feed is terminal
    /// or a fetch is already outstanding.
    pub fn begin_load(&mut self) -> Option<PageRequest> {
        if self.terminal || self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(PageRequest {
            scope: self.scope,
            page: self.cursor + 1,
            limit: PAGE_SIZE,
        })
    }

    /// Near-bottom gate: claims the next page only when the viewport has
    /// reached the end of the scrolled content.
    pub fn trigger(
        &mut self,
        scroll_position: f64,
        page_height: f64,
        viewport_height: f64,
    ) -> Option<PageRequest> {
        if !near_bottom(scroll_position, page_height, viewport_height) {
            return None;
        }
        self.begin_load()
    }

    /// Applies a fetch outcome. On error the cursor and terminal flag stay
    /// put, so scrolling again retries the same page. On success, posts not
    /// yet rendered are appended in arrival order; each carries the channel
    /// its tags arrive on, so this never waits on the detail endpoint (tag
    /// arrival only fills the tag field, it never reorders the post list).
    pub fn complete_load(
        &mut self,
        request: &PageRequest,
        result: Result<FeedPage, ApiError>,
        enricher: &Enricher,
    ) -> Result<Vec<PendingPost>, ApiError> {
        self.in_flight = false;
        let page = result?;

        if page.posts.is_empty() || request.page > page.last_page {
            self.terminal = true;
            return Ok(Vec::new());
        }

        self.cursor = request.page;
        if request.page >= page.last_page {
            // The page just appended is the last one; never fetch past it.
            self.terminal = true;
        }

        let fresh: Vec<Post> = page
            .posts
            .into_iter()
            .filter(|post| self.seen.insert(post.id))
            .collect();

        let mut pending = Vec::with_capacity(fresh.len());
        for post in fresh {
            let tags = enricher.enqueue(post.id);
            self.rendered.push(post.id);
            pending.push(PendingPost { post, tags });
        }
        Ok(pending)
    }

    /// Blocking convenience for callers without their own fetch thread.
    pub fn load_next_page(
        &mut self,
        service: &dyn FeedService,
        enricher: &Enricher,
    ) -> Result<Vec<PostReady>, ApiError> {
        let Some(request) = self.begin_load() else {
            return Ok(Vec::new());
        };
        let result = service.list_posts(request.scope, request.page, request.limit);
        let pending = self.complete_load(&request, result, enricher)?;
        Ok(pending.into_iter().map(PendingPost::resolve).collect())
    }

    /// Classifies an empty feed for display: a user feed without a session
    /// asks for login; an exhausted feed with nothing rendered has no posts.
    pub fn empty_state(&self, session_present: bool) -> Option<EmptyFeed> {
        if !self.rendered.is_empty() {
            return None;
        }
        if matches!(self.scope, FeedScope::User(_)) && !session_present {
            return Some(EmptyFeed::LoginRequired);
        }
        if self.terminal {
            return Some(EmptyFeed::NoPosts);
        }
        None
    }
}

pub fn near_bottom(scroll_position: f64, page_height: f64, viewport_height: f64) -> bool {
    scroll_position + viewport_height + NEAR_BOTTOM_SLACK >= page_height
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::api::PostDraft;
    use crate::data::mock::{page, post, user, MockFeedService, MockPostService};
    use crate::data::PostService;

    fn enricher() -> Enricher {
        Enricher::new(Arc::new(MockPostService::new()), 1)
    }

    fn ids(ready: &[PostReady]) -> Vec<u64> {
        ready.iter().map(|entry| entry.post.id).collect()
    }

    #[test]
    fn first_page_renders_all_posts() {
        let feed = MockFeedService::new();
        feed.push(Ok(page(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], 1, 3)));
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::Global);

        let ready = controller.load_next_page(&feed, &enricher).unwrap();
        assert_eq!(ready.len(), 10);
        assert_eq!(controller.cursor(), 1);
        assert!(!controller.is_terminal());
        assert_eq!(controller.rendered_count(), 10);
    }

    #[test]
    fn concurrent_triggers_issue_one_fetch() {
        let mut controller = FeedController::new(FeedScope::Global);
        let first = controller.begin_load();
        let second = controller.begin_load();
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(controller.in_flight());
    }

    #[test]
    fn near_bottom_gate_controls_trigger() {
        let mut controller = FeedController::new(FeedScope::Global);
        assert!(controller.trigger(0.0, 100.0, 20.0).is_none());
        assert!(!controller.in_flight());
        assert!(controller.trigger(79.0, 100.0, 20.0).is_some());
    }

    #[test]
    fn no_fetch_past_last_page() {
        let feed = MockFeedService::new();
        feed.push(Ok(page(&[1, 2], 1, 1)));
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::Global);

        let ready = controller.load_next_page(&feed, &enricher).unwrap();
        assert_eq!(ready.len(), 2);
        assert!(controller.is_terminal());

        // Further scroll triggers never reach the network.
        for _ in 0..5 {
            let ready = controller.load_next_page(&feed, &enricher).unwrap();
            assert!(ready.is_empty());
        }
        assert_eq!(feed.calls(), 1);
    }

    #[test]
    fn empty_page_marks_terminal_without_append() {
        let feed = MockFeedService::new();
        feed.push(Ok(page(&[], 1, 1)));
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::Global);

        let ready = controller.load_next_page(&feed, &enricher).unwrap();
        assert!(ready.is_empty());
        assert!(controller.is_terminal());
        assert_eq!(controller.cursor(), 0);
    }

    #[test]
    fn duplicate_ids_across_pages_are_dropped() {
        let feed = MockFeedService::new();
        feed.push(Ok(page(&[1, 2, 3], 1, 2)));
        // Overlapping page, as when a concurrent insert shifts the listing.
        feed.push(Ok(page(&[3, 4], 2, 2)));
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::Global);

        let first = controller.load_next_page(&feed, &enricher).unwrap();
        let second = controller.load_next_page(&feed, &enricher).unwrap();
        assert_eq!(ids(&first), vec![1, 2, 3]);
        assert_eq!(ids(&second), vec![4]);
        assert_eq!(controller.rendered_ids(), &[1, 2, 3, 4]);
    }

    #[test]
    fn failure_leaves_the_page_retryable() {
        let feed = MockFeedService::new();
        feed.push(Err(ApiError::Server { status: 500 }));
        feed.push(Ok(page(&[1], 1, 1)));
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::Global);

        let err = controller.load_next_page(&feed, &enricher).unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 500 }));
        assert_eq!(controller.cursor(), 0);
        assert!(!controller.is_terminal());
        assert!(!controller.in_flight());

        // Next trigger retries page 1.
        let ready = controller.load_next_page(&feed, &enricher).unwrap();
        assert_eq!(ids(&ready), vec![1]);
        assert_eq!(feed.calls(), 2);
    }

    #[test]
    fn tag_failure_isolated_to_one_post() {
        let feed = MockFeedService::new();
        feed.push(Ok(page(&[6, 7, 8], 1, 1)));
        let posts = Arc::new(MockPostService::new());
        posts.insert_with_tags(6, &["a"]);
        posts.fail_on(7);
        posts.insert_with_tags(8, &["b", "c"]);
        let enricher = Enricher::new(posts, 2);
        let mut controller = FeedController::new(FeedScope::Global);

        let ready = controller.load_next_page(&feed, &enricher).unwrap();
        assert_eq!(ids(&ready), vec![6, 7, 8]);
        assert_eq!(ready[0].tags.len(), 1);
        assert!(ready[1].tags.is_empty());
        assert_eq!(ready[2].tags.len(), 2);
    }

    struct GatedPostService {
        gate: Arc<Mutex<()>>,
    }

    impl PostService for GatedPostService {
        fn get_post(&self, id: u64) -> Result<Post, ApiError> {
            let _gate = self.gate.lock();
            Ok(post(id, user(1, "author")))
        }

        fn create_post(&self, _draft: &PostDraft, _token: &str) -> Result<Post, ApiError> {
            unreachable!()
        }

        fn update_post(
            &self,
            _id: u64,
            _draft: &PostDraft,
            _token: &str,
        ) -> Result<Post, ApiError> {
            unreachable!()
        }

        fn delete_post(&self, _id: u64, _token: &str) -> Result<(), ApiError> {
            unreachable!()
        }
    }

    #[test]
    fn page_completion_does_not_wait_for_tags() {
        let gate = Arc::new(Mutex::new(()));
        let service = Arc::new(GatedPostService { gate: gate.clone() });
        let enricher = Enricher::new(service, 1);
        let mut controller = FeedController::new(FeedScope::Global);

        // Stall the tag worker; the page must still complete immediately.
        let held = gate.lock();
        let request = controller.begin_load().unwrap();
        let pending = controller
            .complete_load(&request, Ok(page(&[1, 2], 1, 2)), &enricher)
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(controller.rendered_ids(), &[1, 2]);
        assert!(pending[0].tags.try_recv().is_err());

        drop(held);
        for entry in pending {
            entry.resolve();
        }
    }

    #[test]
    fn user_feed_404_is_an_empty_state_not_an_error() {
        // The api client maps the 404 to an empty page before the
        // controller sees it; this mirrors that shape.
        let feed = MockFeedService::new();
        feed.push(Ok(FeedPage {
            posts: Vec::new(),
            current_page: 1,
            last_page: 1,
        }));
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::User(42));

        let ready = controller.load_next_page(&feed, &enricher).unwrap();
        assert!(ready.is_empty());
        assert_eq!(controller.empty_state(true), Some(EmptyFeed::NoPosts));
    }

    #[test]
    fn anonymous_user_feed_asks_for_login() {
        let controller = FeedController::new(FeedScope::User(42));
        assert_eq!(
            controller.empty_state(false),
            Some(EmptyFeed::LoginRequired)
        );
        assert_eq!(controller.empty_state(true), None);
    }

    #[test]
    fn rendered_sequence_grows_without_duplicates() {
        let feed = MockFeedService::new();
        feed.push(Ok(page(&[1, 2], 1, 3)));
        feed.push(Ok(page(&[2, 3], 2, 3)));
        feed.push(Ok(page(&[3, 1, 4], 3, 3)));
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::Global);

        let mut lengths = Vec::new();
        while !controller.is_terminal() {
            controller.load_next_page(&feed, &enricher).unwrap();
            lengths.push(controller.rendered_count());
        }
        assert!(lengths.windows(2).all(|pair| pair[0] <= pair[1]));
        let rendered = controller.rendered_ids();
        let unique: HashSet<_> = rendered.iter().collect();
        assert_eq!(unique.len(), rendered.len());
        assert_eq!(rendered, &[1, 2, 3, 4]);
    }

    #[test]
    fn reset_clears_cursor_and_dedup_state() {
        let feed = MockFeedService::new();
        feed.push(Ok(page(&[1, 2], 1, 1)));
        feed.push(Ok(page(&[1, 2], 1, 1)));
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::Global);

        controller.load_next_page(&feed, &enricher).unwrap();
        assert!(controller.is_terminal());

        controller.reset();
        assert_eq!(controller.cursor(), 0);
        assert!(!controller.is_terminal());

        // After a mutation the feed reloads from page 1 and re-renders
        // the same ids.
        let ready = controller.load_next_page(&feed, &enricher).unwrap();
        assert_eq!(ids(&ready), vec![1, 2]);
    }

    #[test]
    fn page_beyond_last_is_dropped_not_appended() {
        let enricher = enricher();
        let mut controller = FeedController::new(FeedScope::Global);
        let request = controller.begin_load().unwrap();

        // A listing that claims the cursor already overran it.
        let overshoot = page(&[9], 1, 0);
        let ready = controller
            .complete_load(&request, Ok(overshoot), &enricher)
            .unwrap();
        assert!(ready.is_empty());
        assert!(controller.is_terminal());
        assert!(controller.begin_load().is_none());
    }

    #[test]
    fn mock_post_builder_round_trips_author() {
        let entry = post(5, user(9, "lina"));
        assert_eq!(entry.author.id, 9);
        assert_eq!(entry.author.username, "lina");
    }
}
