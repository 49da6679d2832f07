//! Command classification and dispatch.
//!
//! The external classifier returns a free-text label. [`Category::from_label`]
//! is the only place that label is inspected; after that the core works with
//! the closed [`Category`] enum. Because classifier categories are coarse,
//! [`route`] then refines the category with keyword checks on the raw text
//! and picks exactly one handler.

mod normalize;

pub use normalize::{close_target, is_image_request, normalize};

use crate::backend::Backends;
use crate::error::AssistantError;
use crate::events::{CommandEvent, EventBus};
use crate::text;
use tracing::{info, warn};

/// Exit words that, together with an "exit" label, end the session.
const EXIT_WORDS: &[&str] = &["bye", "goodbye", "exit", "quit", "close"];
/// Words that mark a request for the automation handler.
const AUTOMATION_WORDS: &[&str] = &["open", "play", "search", "mute", "unmute", "volume"];

/// Classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Conversation.
    General,
    /// Real-time information lookup.
    Search,
    /// Desktop or browser automation.
    Automation,
    /// Image generation.
    ImageGeneration,
    /// The user wants to quit.
    Exit,
}

impl Category {
    /// Map a free-text classifier label onto a category.
    ///
    /// Unrecognized labels are treated as conversation.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        let has = |needle: &str| label.contains(needle);
        if has("exit") {
            Self::Exit
        } else if has("general") {
            Self::General
        } else if has("realtime") || has("search") || has("google") {
            Self::Search
        } else if has("automation")
            || has("open")
            || has("close")
            || has("play")
            || has("system")
            || has("content")
        {
            Self::Automation
        } else if has("image") || has("generate") {
            Self::ImageGeneration
        } else {
            Self::General
        }
    }
}

/// Handler selected for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run the exit sequence.
    Exit,
    /// Close an application through the automation handler.
    Close,
    /// Generate an image.
    Image,
    /// Run a canonical command through the automation handler.
    Automation,
    /// Ask the chat handler.
    Chat,
    /// Ask the search handler.
    Search,
}

impl Route {
    /// Progress line shown while the handler runs.
    pub fn status(self) -> Option<&'static str> {
        match self {
            Self::Close => Some("Closing application..."),
            Self::Image => Some("Generating image..."),
            Self::Automation => Some("Automating..."),
            Self::Search => Some("Searching..."),
            Self::Chat | Self::Exit => None,
        }
    }
}

/// Refine a category with keyword checks on the raw text.
///
/// Order: exit (label and keyword agree), close words, image requests,
/// automation words, then the category itself.
pub fn route(raw: &str, category: Category) -> Route {
    if category == Category::Exit && text::contains_any(raw, EXIT_WORDS) {
        Route::Exit
    } else if text::contains_any(raw, normalize::CLOSE_WORDS) {
        Route::Close
    } else if is_image_request(raw) {
        Route::Image
    } else if text::contains_any(raw, AUTOMATION_WORDS) {
        Route::Automation
    } else {
        match category {
            Category::Search => Route::Search,
            Category::Automation => Route::Automation,
            Category::ImageGeneration => Route::Image,
            Category::General | Category::Exit => Route::Chat,
        }
    }
}

/// Result of one dispatched command.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Text to show and speak.
    Reply(String),
    /// The handler raised or reported failure.
    Failed(AssistantError),
    /// The exit sequence should run.
    Exit,
}

/// Calls the classifier and the execution handlers.
#[derive(Clone)]
pub struct CommandDispatcher {
    backends: Backends,
}

impl CommandDispatcher {
    /// Create a dispatcher over the given collaborators.
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Ask the external classifier for a category.
    ///
    /// A classifier failure falls back to [`Category::General`].
    pub async fn classify(&self, text: &str) -> Category {
        match self.backends.classifier.classify(text).await {
            Ok(label) => {
                let category = Category::from_label(&label);
                info!("classified {text:?} as {category:?} (label: {label:?})");
                category
            }
            Err(e) => {
                let err = AssistantError::Classifier(e.to_string());
                warn!("{err}, falling back to chat");
                Category::General
            }
        }
    }

    /// Route and execute one command.
    ///
    /// Handler errors never escape; they come back as [`DispatchOutcome::Failed`].
    pub async fn dispatch(
        &self,
        raw: &str,
        category: Category,
        events: &EventBus,
    ) -> DispatchOutcome {
        let route = route(raw, category);
        info!("dispatching {raw:?} via {route:?}");
        if let Some(status) = route.status() {
            events.emit(CommandEvent::status(status));
        }

        match route {
            Route::Exit => DispatchOutcome::Exit,
            Route::Close => self.close(raw).await,
            Route::Automation => self.automate(raw).await,
            Route::Image => match self.backends.images.generate_image(raw).await {
                Ok(()) => DispatchOutcome::Reply(format!("Image generated for: {raw}")),
                Err(e) => failed(format!("Image generation failed: {e}")),
            },
            Route::Search => match self.backends.search.search(raw).await {
                Ok(reply) => reply_or_empty(reply, "search"),
                Err(e) => failed(format!("Search failed: {e}")),
            },
            Route::Chat => match self.backends.chat.chat(raw).await {
                Ok(reply) => reply_or_empty(reply, "chat"),
                Err(e) => failed(format!("Chat failed: {e}")),
            },
        }
    }

    async fn close(&self, raw: &str) -> DispatchOutcome {
        let app = close_target(raw);
        let command = format!("close {app}");
        info!("closing: {app}");
        match self.backends.automation.automate(&command).await {
            Ok(true) => DispatchOutcome::Reply(format!("Closed {app} successfully")),
            Ok(false) => failed(format!("Could not close {app}")),
            Err(e) => failed(format!("Failed to close application: {e}")),
        }
    }

    async fn automate(&self, raw: &str) -> DispatchOutcome {
        let command = normalize(raw);
        info!("automation command: {command:?}");
        match self.backends.automation.automate(&command).await {
            Ok(true) => DispatchOutcome::Reply(format!("Automation task completed: {raw}")),
            Ok(false) => failed(format!("Automation failed for: {raw}")),
            Err(e) => failed(format!("Automation failed: {e}")),
        }
    }
}

fn failed(message: String) -> DispatchOutcome {
    warn!("{message}");
    DispatchOutcome::Failed(AssistantError::Handler(message))
}

fn reply_or_empty(reply: String, handler: &str) -> DispatchOutcome {
    if reply.trim().is_empty() {
        failed(format!("empty response from {handler} handler"))
    } else {
        DispatchOutcome::Reply(reply)
    }
}
