use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::api::{
    ApiError, AuthPayload, Comment, FeedPage, FeedScope, ImageUpload, Post, PostDraft,
    Registration, Tag,
};
use crate::data::{AuthService, CommentService, FeedService, PostService};
use crate::feed::{EmptyFeed, FeedController, PageRequest, PostReady};
use crate::render::{self, PostView};
use crate::session;
use crate::tags::Enricher;

/// How many rows before the end of the list still count as the bottom.
const SCROLL_LOOKAHEAD: f64 = 2.0;

pub struct Options {
    pub status_message: String,
    pub feed_service: Arc<dyn FeedService>,
    pub post_service: Arc<dyn PostService>,
    pub comment_service: Arc<dyn CommentService>,
    pub auth_service: Arc<dyn AuthService>,
    pub session_manager: Arc<session::Manager>,
    pub enricher: Arc<Enricher>,
    pub config_path: String,
    pub theme: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum View {
    Feed,
    Detail,
    Auth,
    Compose,
    ConfirmDelete(u64),
}

enum AsyncResponse {
    Posts {
        generation: u64,
        request: PageRequest,
        result: Result<FeedPage, ApiError>,
    },
    Tags {
        post_id: u64,
        tags: Vec<Tag>,
    },
    Detail {
        post_id: u64,
        result: Result<Post, ApiError>,
    },
    Auth {
        registering: bool,
        result: Result<AuthPayload, ApiError>,
    },
    PostSaved {
        editing: bool,
        result: Result<Post, ApiError>,
    },
    PostDeleted {
        result: Result<(), ApiError>,
    },
    CommentAdded {
        post_id: u64,
        result: Result<Comment, ApiError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AuthField {
    #[default]
    Username,
    Password,
    Name,
    Email,
}

#[derive(Default)]
struct AuthForm {
    active: AuthField,
    registering: bool,
    username: String,
    password: String,
    name: String,
    email: String,
}

impl AuthForm {
    fn reset(&mut self, registering: bool) {
        *self = AuthForm {
            registering,
            ..AuthForm::default()
        };
    }

    fn next(&mut self) {
        self.active = match (self.active, self.registering) {
            (AuthField::Username, _) => AuthField::Password,
            (AuthField::Password, true) => AuthField::Name,
            (AuthField::Password, false) => AuthField::Username,
            (AuthField::Name, _) => AuthField::Email,
            (AuthField::Email, _) => AuthField::Username,
        };
    }

    fn active_value_mut(&mut self) -> &mut String {
        match self.active {
            AuthField::Username => &mut self.username,
            AuthField::Password => &mut self.password,
            AuthField::Name => &mut self.name,
            AuthField::Email => &mut self.email,
        }
    }

    fn insert_char(&mut self, ch: char) {
        self.active_value_mut().push(ch);
    }

    fn backspace(&mut self) {
        self.active_value_mut().pop();
    }

    fn display_value(&self, field: AuthField) -> String {
        let raw = match field {
            AuthField::Username => &self.username,
            AuthField::Password => {
                return "*".repeat(self.password.chars().count());
            }
            AuthField::Name => &self.name,
            AuthField::Email => &self.email,
        };
        raw.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PostField {
    #[default]
    Title,
    Body,
    ImagePath,
}

#[derive(Default)]
struct PostForm {
    active: PostField,
    title: String,
    body: String,
    image_path: String,
    editing: Option<u64>,
}

impl PostForm {
    fn reset(&mut self) {
        *self = PostForm::default();
    }

    fn prefill(&mut self, post: &Post) {
        self.reset();
        self.title = post.title.clone();
        self.body = post.body.clone();
        self.editing = Some(post.id);
    }

    fn next(&mut self) {
        self.active = match self.active {
            PostField::Title => PostField::Body,
            PostField::Body => PostField::ImagePath,
            PostField::ImagePath => PostField::Title,
        };
    }

    fn active_value_mut(&mut self) -> &mut String {
        match self.active {
            PostField::Title => &mut self.title,
            PostField::Body => &mut self.body,
            PostField::ImagePath => &mut self.image_path,
        }
    }

    fn insert_char(&mut self, ch: char) {
        self.active_value_mut().push(ch);
    }

    fn backspace(&mut self) {
        self.active_value_mut().pop();
    }
}

struct DetailState {
    post_id: u64,
    post: Option<Post>,
    error: Option<String>,
    scroll: u16,
    composing: bool,
    comment_input: String,
}

impl DetailState {
    fn new(post_id: u64) -> Self {
        Self {
            post_id,
            post: None,
            error: None,
            scroll: 0,
            composing: false,
            comment_input: String::new(),
        }
    }
}

pub struct Model {
    feed_service: Arc<dyn FeedService>,
    post_service: Arc<dyn PostService>,
    comment_service: Arc<dyn CommentService>,
    auth_service: Arc<dyn AuthService>,
    session_manager: Arc<session::Manager>,
    enricher: Arc<Enricher>,
    controller: FeedController,
    generation: u64,
    rendered: Vec<PostReady>,
    list_state: ListState,
    view: View,
    detail: Option<DetailState>,
    auth_form: AuthForm,
    post_form: PostForm,
    status_message: String,
    config_path: String,
    accent: Color,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    should_quit: bool,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let accent = match options.theme.as_str() {
            "dracula" => Color::Magenta,
            "light" => Color::Blue,
            _ => Color::Cyan,
        };
        Self {
            feed_service: options.feed_service,
            post_service: options.post_service,
            comment_service: options.comment_service,
            auth_service: options.auth_service,
            session_manager: options.session_manager,
            enricher: options.enricher,
            controller: FeedController::new(FeedScope::Global),
            generation: 0,
            rendered: Vec::new(),
            list_state: ListState::default(),
            view: View::Feed,
            detail: None,
            auth_form: AuthForm::default(),
            post_form: PostForm::default(),
            status_message: options.status_message,
            config_path: options.config_path,
            accent,
            response_tx,
            response_rx,
            should_quit: false,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode().context("enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("create terminal")?;

        self.kick_off_feed();
        let result = self.event_loop(&mut terminal);

        disable_raw_mode().ok();
        execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
        terminal.show_cursor().ok();
        result
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        while !self.should_quit {
            self.drain_responses();
            terminal.draw(|frame| self.draw(frame))?;
            if event::poll(Duration::from_millis(100)).context("poll events")? {
                if let Event::Key(key) = event::read().context("read event")? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn session_present(&self) -> bool {
        self.session_manager.is_authenticated()
    }

    fn kick_off_feed(&mut self) {
        // Anonymous user feed: show the log-in prompt, skip the fetch.
        if self.controller.empty_state(self.session_present())
            == Some(EmptyFeed::LoginRequired)
        {
            return;
        }
        if let Some(request) = self.controller.begin_load() {
            self.start_posts_fetch(request);
        }
    }

    fn reload_feed(&mut self) {
        self.generation += 1;
        self.controller.reset();
        self.rendered.clear();
        self.list_state.select(None);
        self.kick_off_feed();
    }

    fn switch_scope(&mut self, scope: FeedScope) {
        if self.controller.scope() == scope {
            return;
        }
        self.generation += 1;
        self.controller = FeedController::new(scope);
        self.rendered.clear();
        self.list_state.select(None);
        self.kick_off_feed();
    }

    fn start_posts_fetch(&mut self, request: PageRequest) {
        let tx = self.response_tx.clone();
        let service = self.feed_service.clone();
        let generation = self.generation;
        thread::spawn(move || {
            let result = service.list_posts(request.scope, request.page, request.limit);
            let _ = tx.send(AsyncResponse::Posts {
                generation,
                request,
                result,
            });
        });
    }

    fn start_detail_fetch(&mut self, post_id: u64) {
        let tx = self.response_tx.clone();
        let service = self.post_service.clone();
        thread::spawn(move || {
            let result = service.get_post(post_id);
            let _ = tx.send(AsyncResponse::Detail { post_id, result });
        });
    }

    fn maybe_fetch_on_scroll(&mut self) {
        let selected = self.list_state.selected().unwrap_or(0);
        let total = self.rendered.len();
        if let Some(request) =
            self.controller
                .trigger(selected as f64, total as f64, SCROLL_LOOKAHEAD)
        {
            self.start_posts_fetch(request);
        }
    }

    fn drain_responses(&mut self) {
        while let Ok(response) = self.response_rx.try_recv() {
            match response {
                AsyncResponse::Posts {
                    generation,
                    request,
                    result,
                } => self.on_posts(generation, request, result),
                AsyncResponse::Tags { post_id, tags } => self.on_tags(post_id, tags),
                AsyncResponse::Detail { post_id, result } => self.on_detail(post_id, result),
                AsyncResponse::Auth {
                    registering,
                    result,
                } => self.on_auth(registering, result),
                AsyncResponse::PostSaved { editing, result } => self.on_post_saved(editing, result),
                AsyncResponse::PostDeleted { result } => self.on_post_deleted(result),
                AsyncResponse::CommentAdded { post_id, result } => {
                    self.on_comment_added(post_id, result)
                }
            }
        }
    }

    fn on_posts(
        &mut self,
        generation: u64,
        request: PageRequest,
        result: Result<FeedPage, ApiError>,
    ) {
        if generation != self.generation {
            // Response for a feed that was reset or switched away from.
            return;
        }
        match self.controller.complete_load(&request, result, &self.enricher) {
            Ok(pending) => {
                if pending.is_empty() {
                    return;
                }
                // Show the posts right away; their tags trickle in over the
                // response channel so a slow detail fetch never stalls a
                // frame.
                let mut awaited = Vec::with_capacity(pending.len());
                for entry in pending {
                    awaited.push((entry.post.id, entry.tags));
                    self.rendered.push(PostReady {
                        post: entry.post,
                        tags: Vec::new(),
                    });
                }
                if self.list_state.selected().is_none() {
                    self.list_state.select(Some(0));
                }
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    for (post_id, rx) in awaited {
                        let tags = rx.recv().unwrap_or_default();
                        if !tags.is_empty() {
                            let _ = tx.send(AsyncResponse::Tags { post_id, tags });
                        }
                    }
                });
            }
            Err(_) => {
                self.status_message =
                    "Error fetching posts, please try again later.".to_string();
            }
        }
    }

    fn on_tags(&mut self, post_id: u64, tags: Vec<Tag>) {
        if let Some(ready) = self
            .rendered
            .iter_mut()
            .find(|ready| ready.post.id == post_id)
        {
            ready.tags = tags;
        }
    }

    fn on_detail(&mut self, post_id: u64, result: Result<Post, ApiError>) {
        let Some(detail) = self.detail.as_mut() else {
            return;
        };
        if detail.post_id != post_id {
            return;
        }
        match result {
            Ok(post) => {
                detail.post = Some(post);
                detail.error = None;
            }
            Err(_) => {
                detail.error = Some(
                    "The requested post could not be loaded. Please try again later."
                        .to_string(),
                );
            }
        }
    }

    fn on_auth(&mut self, registering: bool, result: Result<AuthPayload, ApiError>) {
        match result {
            Ok(payload) => match self.session_manager.install(payload) {
                Ok(()) => {
                    self.status_message = if registering {
                        "Registration successful".to_string()
                    } else {
                        "Login successful".to_string()
                    };
                    self.view = View::Feed;
                    // A user feed shown while anonymous starts loading now.
                    if matches!(self.controller.scope(), FeedScope::User(_))
                        && self.rendered.is_empty()
                    {
                        self.reload_feed();
                    }
                }
                Err(err) => {
                    self.status_message = format!("Failed to save session: {err}");
                }
            },
            Err(err) => {
                self.status_message = if registering {
                    err.user_message()
                } else {
                    "login failed".to_string()
                };
            }
        }
    }

    fn on_post_saved(&mut self, editing: bool, result: Result<Post, ApiError>) {
        match result {
            Ok(_) => {
                self.status_message = if editing {
                    "Post updated successfully".to_string()
                } else {
                    "Post created successfully".to_string()
                };
                self.view = View::Feed;
                self.post_form.reset();
                self.reload_feed();
            }
            Err(err) => {
                self.status_message = err.user_message();
                self.view = View::Feed;
            }
        }
    }

    fn on_post_deleted(&mut self, result: Result<(), ApiError>) {
        match result {
            Ok(()) => {
                self.status_message = "Post deleted successfully".to_string();
                self.reload_feed();
            }
            Err(_) => {
                self.status_message =
                    "Error deleting post. Please try again later.".to_string();
            }
        }
    }

    fn on_comment_added(&mut self, post_id: u64, result: Result<Comment, ApiError>) {
        match result {
            Ok(_) => {
                if let Some(detail) = self.detail.as_mut() {
                    detail.comment_input.clear();
                    detail.composing = false;
                }
                self.start_detail_fetch(post_id);
            }
            Err(err) => {
                self.status_message = match err {
                    ApiError::Unauthorized => err.user_message(),
                    _ => "Error: Could not post your comment.".to_string(),
                };
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.view {
            View::Feed => self.handle_feed_key(key),
            View::Detail => self.handle_detail_key(key),
            View::Auth => self.handle_auth_key(key),
            View::Compose => self.handle_compose_key(key),
            View::ConfirmDelete(post_id) => self.handle_confirm_key(key, post_id),
        }
    }

    fn selected_ready(&self) -> Option<&PostReady> {
        self.rendered.get(self.list_state.selected()?)
    }

    fn selected_view(&self) -> Option<PostView> {
        let session = self.session_manager.current();
        self.selected_ready()
            .map(|ready| render::post_view(&ready.post, &ready.tags, session.as_ref()))
    }

    fn handle_feed_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => {
                let total = self.rendered.len();
                if total > 0 {
                    let next = self
                        .list_state
                        .selected()
                        .map_or(0, |index| (index + 1).min(total - 1));
                    self.list_state.select(Some(next));
                }
                self.maybe_fetch_on_scroll();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if let Some(index) = self.list_state.selected() {
                    self.list_state.select(Some(index.saturating_sub(1)));
                }
            }
            KeyCode::Char('g') => {
                self.switch_scope(FeedScope::Global);
            }
            KeyCode::Char('u') => match self.session_manager.user_id() {
                Some(user_id) => self.switch_scope(FeedScope::User(user_id)),
                None => {
                    self.status_message = "Please log in to view your posts.".to_string();
                }
            },
            KeyCode::Char('r') => self.reload_feed(),
            KeyCode::Enter => {
                if let Some(ready) = self.selected_ready() {
                    let post_id = ready.post.id;
                    self.detail = Some(DetailState::new(post_id));
                    self.view = View::Detail;
                    self.start_detail_fetch(post_id);
                }
            }
            KeyCode::Char('n') => {
                if self.session_present() {
                    self.post_form.reset();
                    self.view = View::Compose;
                } else {
                    self.status_message = ApiError::MissingToken.user_message();
                }
            }
            KeyCode::Char('e') => {
                if let Some(view) = self.selected_view() {
                    if view.can_modify {
                        let post = self.selected_ready().map(|ready| ready.post.clone());
                        if let Some(post) = post {
                            self.post_form.prefill(&post);
                            self.view = View::Compose;
                        }
                    } else {
                        self.status_message = "You can only edit your own posts.".to_string();
                    }
                }
            }
            KeyCode::Char('d') => {
                if let Some(view) = self.selected_view() {
                    if view.can_modify {
                        self.view = View::ConfirmDelete(view.id);
                    } else {
                        self.status_message = "You can only delete your own posts.".to_string();
                    }
                }
            }
            KeyCode::Char('l') => {
                self.auth_form.reset(false);
                self.view = View::Auth;
            }
            KeyCode::Char('R') => {
                self.auth_form.reset(true);
                self.view = View::Auth;
            }
            KeyCode::Char('o') => {
                if self.session_present() {
                    match self.session_manager.clear() {
                        Ok(()) => self.status_message = "Logged out".to_string(),
                        Err(err) => {
                            self.status_message = format!("Failed to clear session: {err}")
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        let composing = self.detail.as_ref().map_or(false, |detail| detail.composing);
        if composing {
            match key.code {
                KeyCode::Esc => {
                    if let Some(detail) = self.detail.as_mut() {
                        detail.composing = false;
                    }
                }
                KeyCode::Enter => self.submit_comment(),
                KeyCode::Backspace => {
                    if let Some(detail) = self.detail.as_mut() {
                        detail.comment_input.pop();
                    }
                }
                KeyCode::Char(ch) => {
                    if let Some(detail) = self.detail.as_mut() {
                        detail.comment_input.push(ch);
                    }
                }
                _ => {}
            }
            return;
        }
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.detail = None;
                self.view = View::Feed;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if let Some(detail) = self.detail.as_mut() {
                    detail.scroll = detail.scroll.saturating_add(1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if let Some(detail) = self.detail.as_mut() {
                    detail.scroll = detail.scroll.saturating_sub(1);
                }
            }
            KeyCode::Char('c') => {
                if self.session_present() {
                    if let Some(detail) = self.detail.as_mut() {
                        detail.composing = true;
                    }
                } else {
                    self.status_message = ApiError::MissingToken.user_message();
                }
            }
            _ => {}
        }
    }

    fn handle_auth_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.view = View::Feed,
            KeyCode::Tab => self.auth_form.next(),
            KeyCode::Enter => self.submit_auth(),
            KeyCode::Backspace => self.auth_form.backspace(),
            KeyCode::Char(ch) => self.auth_form.insert_char(ch),
            _ => {}
        }
    }

    fn handle_compose_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.post_form.reset();
                self.view = View::Feed;
            }
            KeyCode::Tab => self.post_form.next(),
            KeyCode::Enter => self.submit_post(),
            KeyCode::Backspace => self.post_form.backspace(),
            KeyCode::Char(ch) => self.post_form.insert_char(ch),
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent, post_id: u64) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.view = View::Feed;
                self.delete_post(post_id);
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.view = View::Feed;
            }
            _ => {}
        }
    }

    fn submit_auth(&mut self) {
        let registering = self.auth_form.registering;
        let service = self.auth_service.clone();
        let tx = self.response_tx.clone();
        self.status_message = "Attempting to log in...".to_string();
        if registering {
            let registration = Registration {
                username: self.auth_form.username.clone(),
                password: self.auth_form.password.clone(),
                name: self.auth_form.name.clone(),
                email: self.auth_form.email.clone(),
                image: None,
            };
            thread::spawn(move || {
                let result = service.register(&registration);
                let _ = tx.send(AsyncResponse::Auth {
                    registering: true,
                    result,
                });
            });
        } else {
            let username = self.auth_form.username.clone();
            let password = self.auth_form.password.clone();
            thread::spawn(move || {
                let result = service.login(&username, &password);
                let _ = tx.send(AsyncResponse::Auth {
                    registering: false,
                    result,
                });
            });
        }
    }

    fn submit_post(&mut self) {
        let token = match self.session_manager.require_token() {
            Ok(token) => token,
            Err(err) => {
                self.status_message = err.user_message();
                return;
            }
        };
        let image = match self.read_image() {
            Ok(image) => image,
            Err(message) => {
                self.status_message = message;
                return;
            }
        };
        let draft = PostDraft {
            title: self.post_form.title.clone(),
            body: self.post_form.body.clone(),
            image,
        };
        let editing = self.post_form.editing;
        let service = self.post_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || match editing {
            Some(post_id) => {
                let result = service.update_post(post_id, &draft, &token);
                let _ = tx.send(AsyncResponse::PostSaved {
                    editing: true,
                    result,
                });
            }
            None => {
                let result = service.create_post(&draft, &token);
                let _ = tx.send(AsyncResponse::PostSaved {
                    editing: false,
                    result,
                });
            }
        });
    }

    fn read_image(&self) -> Result<Option<ImageUpload>, String> {
        let path = self.post_form.image_path.trim();
        if path.is_empty() {
            return Ok(None);
        }
        let bytes = std::fs::read(path).map_err(|err| format!("Cannot read image: {err}"))?;
        let file_name = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        Ok(Some(ImageUpload { file_name, bytes }))
    }

    fn delete_post(&mut self, post_id: u64) {
        let token = match self.session_manager.require_token() {
            Ok(token) => token,
            Err(err) => {
                self.status_message = err.user_message();
                return;
            }
        };
        let service = self.post_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.delete_post(post_id, &token);
            let _ = tx.send(AsyncResponse::PostDeleted { result });
        });
    }

    fn submit_comment(&mut self) {
        let Some(detail) = self.detail.as_ref() else {
            return;
        };
        let body = detail.comment_input.trim().to_string();
        if body.is_empty() {
            self.status_message = "Comment cannot be empty.".to_string();
            return;
        }
        let token = match self.session_manager.require_token() {
            Ok(token) => token,
            Err(err) => {
                self.status_message = err.user_message();
                return;
            }
        };
        let post_id = detail.post_id;
        let service = self.comment_service.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.add_comment(post_id, &body, &token);
            let _ = tx.send(AsyncResponse::CommentAdded { post_id, result });
        });
    }

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(2)])
            .split(frame.size());

        match self.view {
            View::Feed => self.draw_feed(frame, chunks[0]),
            View::Detail => self.draw_detail(frame, chunks[0]),
            View::Auth => self.draw_auth(frame, chunks[0]),
            View::Compose => self.draw_compose(frame, chunks[0]),
            View::ConfirmDelete(_) => self.draw_confirm(frame, chunks[0]),
        }
        self.draw_status(frame, chunks[1]);
    }

    fn feed_title(&self) -> String {
        match self.controller.scope() {
            FeedScope::Global => "Posts".to_string(),
            FeedScope::User(_) => "My Posts".to_string(),
        }
    }

    fn draw_feed(&mut self, frame: &mut Frame, area: Rect) {
        let session = self.session_manager.current();
        if self.rendered.is_empty() {
            let message = match self.controller.empty_state(session.is_some()) {
                Some(EmptyFeed::LoginRequired) => {
                    "Please Log In\n\nYou need to log in to view your posts.".to_string()
                }
                Some(EmptyFeed::NoPosts) => match self.controller.scope() {
                    FeedScope::User(_) => {
                        "No Posts Yet\n\nYou haven't created any posts yet. Press 'n' to create your first post!"
                            .to_string()
                    }
                    FeedScope::Global => "No posts yet.".to_string(),
                },
                None => "Loading posts...".to_string(),
            };
            let paragraph = Paragraph::new(message)
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(self.feed_title()),
                );
            frame.render_widget(paragraph, area);
            return;
        }

        let width = area.width.saturating_sub(6).max(20) as usize;
        let items: Vec<ListItem> = self
            .rendered
            .iter()
            .map(|ready| {
                let view = render::post_view(&ready.post, &ready.tags, session.as_ref());
                list_item_for(&view, width, self.accent)
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(self.feed_title()),
            )
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn draw_detail(&mut self, frame: &mut Frame, area: Rect) {
        let Some(detail) = self.detail.as_ref() else {
            return;
        };
        let mut lines: Vec<Line> = Vec::new();
        if let Some(error) = &detail.error {
            lines.push(Line::from(Span::styled(
                "Post not found",
                Style::default().add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(error.clone()));
        } else if let Some(post) = &detail.post {
            let view = render::post_view(
                post,
                &post.tags,
                self.session_manager.current().as_ref(),
            );
            lines.push(Line::from(Span::styled(
                view.title.clone(),
                Style::default()
                    .fg(self.accent)
                    .add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(Span::styled(
                format!("{} · {}", view.author_handle, view.created_at),
                Style::default().add_modifier(Modifier::DIM),
            )));
            lines.push(Line::from(""));
            for wrapped in textwrap::wrap(&view.body, area.width.saturating_sub(4) as usize) {
                lines.push(Line::from(wrapped.to_string()));
            }
            if !view.tag_labels.is_empty() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    view.tag_labels
                        .iter()
                        .map(|label| format!("#{label}"))
                        .collect::<Vec<_>>()
                        .join(" "),
                    Style::default().fg(Color::Green),
                )));
            }
            lines.push(Line::from(""));
            if post.comments.is_empty() {
                lines.push(Line::from("No comments yet."));
            } else {
                lines.push(Line::from(Span::styled(
                    format!("Comments ({})", post.comments.len()),
                    Style::default().add_modifier(Modifier::BOLD),
                )));
                for comment in &post.comments {
                    let comment_view = render::comment_view(comment);
                    lines.push(Line::from(Span::styled(
                        format!("{}:", comment_view.author_handle),
                        Style::default().fg(self.accent),
                    )));
                    for wrapped in
                        textwrap::wrap(&comment_view.body, area.width.saturating_sub(6) as usize)
                    {
                        lines.push(Line::from(format!("  {wrapped}")));
                    }
                }
            }
            if detail.composing {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("Comment: {}_", detail.comment_input),
                    Style::default().fg(Color::Yellow),
                )));
            }
        } else {
            lines.push(Line::from("Loading post..."));
        }

        let paragraph = Paragraph::new(Text::from(lines))
            .scroll((detail.scroll, 0))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Post"));
        frame.render_widget(paragraph, area);
    }

    fn draw_auth(&mut self, frame: &mut Frame, area: Rect) {
        let title = if self.auth_form.registering {
            "Register"
        } else {
            "Log In"
        };
        let mut fields = vec![
            (AuthField::Username, "Username"),
            (AuthField::Password, "Password"),
        ];
        if self.auth_form.registering {
            fields.push((AuthField::Name, "Name"));
            fields.push((AuthField::Email, "Email"));
        }
        let mut lines: Vec<Line> = Vec::new();
        for (field, label) in fields {
            let marker = if self.auth_form.active == field {
                "> "
            } else {
                "  "
            };
            let style = if self.auth_form.active == field {
                Style::default().fg(self.accent)
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(
                format!("{marker}{label}: {}", self.auth_form.display_value(field)),
                style,
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab: next field · Enter: submit · Esc: cancel",
            Style::default().add_modifier(Modifier::DIM),
        )));
        let paragraph = Paragraph::new(Text::from(lines))
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(paragraph, area);
    }

    fn draw_compose(&mut self, frame: &mut Frame, area: Rect) {
        let title = if self.post_form.editing.is_some() {
            "Edit Post"
        } else {
            "New Post"
        };
        let fields = [
            (PostField::Title, "Title", self.post_form.title.clone()),
            (PostField::Body, "Body", self.post_form.body.clone()),
            (
                PostField::ImagePath,
                "Image path (optional)",
                self.post_form.image_path.clone(),
            ),
        ];
        let mut lines: Vec<Line> = Vec::new();
        for (field, label, value) in fields {
            let marker = if self.post_form.active == field {
                "> "
            } else {
                "  "
            };
            let style = if self.post_form.active == field {
                Style::default().fg(self.accent)
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(
                format!("{marker}{label}: {value}"),
                style,
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab: next field · Enter: submit · Esc: cancel",
            Style::default().add_modifier(Modifier::DIM),
        )));
        let paragraph = Paragraph::new(Text::from(lines))
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(paragraph, area);
    }

    fn draw_confirm(&mut self, frame: &mut Frame, area: Rect) {
        let paragraph = Paragraph::new(
            "Are you sure you want to delete this post? This action cannot be undone.\n\n  y: delete · n: keep",
        )
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Delete Post"));
        frame.render_widget(paragraph, area);
    }

    fn draw_status(&mut self, frame: &mut Frame, area: Rect) {
        let identity = match self.session_manager.current() {
            Some(session) => format!("@{}", session.user.username),
            None => "anonymous".to_string(),
        };
        let help = match self.view {
            View::Feed => {
                "j/k: scroll · Enter: open · g/u: feeds · n: new · e/d: edit/delete · l/R: log in/register · o: log out · q: quit"
            }
            View::Detail => "j/k: scroll · c: comment · Esc: back",
            View::Auth | View::Compose => "Tab: next · Enter: submit · Esc: cancel",
            View::ConfirmDelete(_) => "y: delete · n: keep",
        };
        let lines = vec![
            Line::from(Span::styled(
                format!("{} · {} · {}", identity, self.status_message, self.config_path),
                Style::default().fg(Color::Yellow),
            )),
            Line::from(Span::styled(
                help,
                Style::default().add_modifier(Modifier::DIM),
            )),
        ];
        frame.render_widget(Paragraph::new(Text::from(lines)), area);
    }
}

fn list_item_for(view: &PostView, width: usize, accent: Color) -> ListItem<'static> {
    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(Span::styled(
        view.title.clone(),
        Style::default().fg(accent).add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        format!("{} · {}", view.author_handle, view.created_at),
        Style::default().add_modifier(Modifier::DIM),
    )));
    for wrapped in textwrap::wrap(&view.body, width).into_iter().take(3) {
        lines.push(Line::from(wrapped.to_string()));
    }
    let mut footer = format!("({}) Comments", view.comments_count);
    if !view.tag_labels.is_empty() {
        let labels = view
            .tag_labels
            .iter()
            .map(|label| format!("#{label}"))
            .collect::<Vec<_>>()
            .join(" ");
        footer = format!("{footer} · {labels}");
    }
    if view.can_modify {
        footer = format!("{footer} · [e]dit [d]elete");
    }
    lines.push(Line::from(Span::styled(
        footer,
        Style::default().fg(Color::Green),
    )));
    lines.push(Line::from(""));
    ListItem::new(Text::from(lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_form_cycles_fields_for_each_mode() {
        let mut form = AuthForm::default();
        form.reset(false);
        form.next();
        assert_eq!(form.active, AuthField::Password);
        form.next();
        assert_eq!(form.active, AuthField::Username);

        form.reset(true);
        form.next();
        form.next();
        assert_eq!(form.active, AuthField::Name);
        form.next();
        assert_eq!(form.active, AuthField::Email);
    }

    #[test]
    fn auth_form_masks_password() {
        let mut form = AuthForm::default();
        form.next();
        form.insert_char('a');
        form.insert_char('b');
        assert_eq!(form.display_value(AuthField::Password), "**");
    }

    #[test]
    fn post_form_prefills_for_edit() {
        use crate::data::mock::{post, user};
        let mut form = PostForm::default();
        form.image_path = "stale.jpg".into();
        let entry = post(12, user(1, "omar"));
        form.prefill(&entry);
        assert_eq!(form.editing, Some(12));
        assert_eq!(form.title, "post 12");
        assert!(form.image_path.is_empty());
    }
}
