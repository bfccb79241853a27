pub mod classifier;
pub mod generator;
pub mod logging;
pub mod ollama;
pub mod zotero;

pub use classifier::{Classification, ClassifierError, ZeroShotClassifier};
pub use generator::{Conversation, GeneratorError, TextGenerator, Turn};
pub use ollama::{
    GenerateOptions, OllamaClient, OllamaClientBuilder, OllamaClientTrait, OllamaError,
};
pub use zotero::{ItemRecord, ZoteroError, ZoteroStore};
