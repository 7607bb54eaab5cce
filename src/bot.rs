//! Message handling
//!
//! Ties the pieces together: classify the text, run the dialog engine on the
//! stored session, call an extension when the transition asks for one, and
//! persist the result.

use crate::classifier::{Classifier, ClassifierError};
use crate::config::{BotDefinition, ConfigError, ReplyPolicy};
use crate::domain::{Answer, Domain, DomainError, DomainSnapshot};
use crate::extension::{ExtensionError, ExtensionRegistry, ExtensionRequest};
use crate::state_machine::{default_answers, execute, Outcome, Session};
use crate::store::{SessionStore, StoreError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid domain: {0}")]
    Domain(#[from] DomainError),
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The extension failed; `answers` holds the configured error reply
    #[error("Extension failed: {source}")]
    Extension {
        #[source]
        source: ExtensionError,
        answers: Vec<Answer>,
    },
}

/// One inbound message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub sender: String,
    pub channel: String,
    /// Thread within the channel, for channels that have them
    pub thread: Option<String>,
    pub text: String,
}

impl Message {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Key of the session this message belongs to: the thread for threaded
    /// channels, the sender otherwise
    pub fn conversation_id(&self) -> String {
        match &self.thread {
            Some(thread) if !thread.is_empty() => format!("{}:{}", self.channel, thread),
            _ => self.sender.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Unsure,
    Unknown,
    Answered,
    Extension,
}

/// Answers for one message; may be empty when the reply policy says so
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub conversation_id: String,
    pub kind: ReplyKind,
    pub answers: Vec<Answer>,
}

/// Trained classifier and compiled domain, replaced together on reload
#[derive(Debug)]
pub struct Brain {
    classifier: Classifier,
    domain: Domain,
    snapshot: DomainSnapshot,
}

impl Brain {
    pub fn new(classifier: Classifier, domain: Domain) -> Self {
        let snapshot = domain.snapshot();
        Self {
            classifier,
            domain,
            snapshot,
        }
    }

    /// Compile the domain and train the classifier for `definition`.
    ///
    /// With a `model_file`, a saved model is reused when its labels match
    /// the training data; otherwise the model is trained and saved there.
    pub fn from_definition(
        definition: &BotDefinition,
        model_file: Option<&Path>,
    ) -> Result<Self, BotError> {
        let domain = Domain::new(&definition.transitions, definition.defaults.clone())?;
        tracing::info!(
            bot = %definition.name,
            states = domain.states().len(),
            commands = ?domain.commands(),
            "Domain loaded"
        );

        let classifier = match model_file.and_then(|path| load_model(path, definition)) {
            Some(classifier) => classifier,
            None => {
                let classifier = Classifier::train_with(
                    &definition.classification,
                    definition.pipeline.clone(),
                    definition.model,
                );
                tracing::info!(
                    labels = classifier.labels().len(),
                    accuracy = classifier.training_accuracy(&definition.classification),
                    "Classifier trained"
                );
                if let Some(path) = model_file {
                    classifier.save(path)?;
                    tracing::info!(path = %path.display(), "Classifier model saved");
                }
                classifier
            }
        };

        Ok(Self::new(classifier, domain))
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }
}

/// A saved model, unless it is missing, unreadable or trained differently
fn load_model(path: &Path, definition: &BotDefinition) -> Option<Classifier> {
    if !path.exists() {
        return None;
    }
    let classifier = match Classifier::load(path) {
        Ok(classifier) => classifier,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable model file");
            return None;
        }
    };

    let mut labels: Vec<&str> = Vec::new();
    for class in &definition.classification {
        if !labels.contains(&class.command.as_str()) {
            labels.push(&class.command);
        }
    }
    if classifier.labels().iter().map(String::as_str).ne(labels) {
        tracing::warn!(path = %path.display(), "Model labels differ from training data, retraining");
        return None;
    }
    if classifier.params() != definition.model || *classifier.pipeline() != definition.pipeline {
        tracing::warn!(path = %path.display(), "Model options changed, retraining");
        return None;
    }

    tracing::info!(path = %path.display(), "Classifier model loaded");
    Some(classifier)
}

/// The conversational front door.
///
/// Two messages for the same conversation handled concurrently race: both
/// read the stored session and the last write wins. Callers that need
/// ordering must serialize messages per conversation.
pub struct Bot {
    name: String,
    brain: RwLock<Arc<Brain>>,
    store: Arc<dyn SessionStore>,
    extensions: ExtensionRegistry,
    replies: ReplyPolicy,
}

impl Bot {
    pub fn new(
        name: impl Into<String>,
        brain: Brain,
        store: Arc<dyn SessionStore>,
        extensions: ExtensionRegistry,
        replies: ReplyPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            brain: RwLock::new(Arc::new(brain)),
            store,
            extensions,
            replies,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The brain in use right now; unaffected by later reloads
    pub async fn brain(&self) -> Arc<Brain> {
        self.brain.read().await.clone()
    }

    /// Swap in a new classifier and domain. In-flight messages finish with
    /// the brain they started with.
    pub async fn reload(&self, brain: Brain) {
        let states = brain.domain.states().len();
        *self.brain.write().await = Arc::new(brain);
        tracing::info!(bot = %self.name, states, "Bot reloaded");
    }

    /// Handle one message.
    ///
    /// Unsure and unknown commands leave the session as it was. When an
    /// extension fails nothing is stored and the error carries the reply.
    pub async fn answer(&self, message: &Message) -> Result<Reply, BotError> {
        let brain = self.brain().await;
        let conversation_id = message.conversation_id();

        let (mut session, stored) = match self.store.get(&conversation_id).await {
            Ok(session) => (session, true),
            Err(StoreError::NotFound(_)) => (Session::new(), false),
            Err(e) => return Err(e.into()),
        };
        if !stored {
            self.store.set(&conversation_id, &session).await?;
        }
        // Back in the initial state counts as a new conversation
        let existing = stored && !session.is_initial();
        let flags = self.replies.flags(existing);

        let prediction = brain.classifier.predict(&message.text);
        let outcome = execute(&brain.domain, &mut session, &prediction.label, &message.text);
        tracing::debug!(
            conversation = %conversation_id,
            command = %prediction.label,
            outcome = outcome.kind(),
            state = session.state,
            "Message handled"
        );

        let (kind, answers) = match outcome {
            Outcome::Unsure { answers } => (ReplyKind::Unsure, if flags.unsure { answers } else { vec![] }),
            Outcome::Unknown { answers } => {
                (ReplyKind::Unknown, if flags.unknown { answers } else { vec![] })
            }
            Outcome::Matched { answers } => {
                self.store.set(&conversation_id, &session).await?;
                (ReplyKind::Answered, answers)
            }
            Outcome::Delegate { extension } => {
                let request = ExtensionRequest {
                    session,
                    extension,
                    command: prediction.label,
                    text: message.text.clone(),
                    channel: message.channel.clone(),
                    domain: brain.snapshot.clone(),
                };
                match self.extensions.dispatch(&request).await {
                    Ok(response) => {
                        self.store.set(&conversation_id, &response.session).await?;
                        (ReplyKind::Extension, response.answers)
                    }
                    Err(source) => {
                        tracing::error!(
                            conversation = %conversation_id,
                            extension = %request.extension,
                            error = %source,
                            "Extension failed"
                        );
                        let answers = if flags.error {
                            default_answers(&brain.domain.defaults().error)
                        } else {
                            vec![]
                        };
                        return Err(BotError::Extension { source, answers });
                    }
                }
            }
        };

        Ok(Reply {
            conversation_id,
            kind,
            answers,
        })
    }
}
