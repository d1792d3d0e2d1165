//! External collaborators and their trait seams. Each trait has one
//! production implementation here; tests provide scripted stand-ins.

pub mod chat;
pub mod inpaint;
pub mod memo;
pub mod ocr;
pub mod panel_source;
pub mod renderer;

pub use chat::{AnthropicChat, ChatModel};
pub use inpaint::{Inpainter, NeighborFillInpainter};
pub use memo::TranslationMemo;
pub use ocr::{OcrEngine, RemoteOcrClient};
pub use panel_source::{DirectoryPanelSource, HttpPanelSource, PanelSource};
pub use renderer::{CosmicTextRenderer, TextRenderer};
