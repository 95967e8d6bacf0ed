pub mod engine;
pub mod protocol;
pub mod session;

pub mod clock;
pub mod markup;
pub mod tokenizer;
pub mod narrative_parser;
pub mod playlist;
pub mod stream;
pub mod poller;
pub mod typewriter;
pub mod navigation;
pub mod choice_detector;

pub mod prompt_builder;
pub mod llm_client;
pub mod transcript_io;
pub mod save_store;
