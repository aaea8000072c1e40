//! Retrieval-augmented question answering over the stored collection.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Settings;
use crate::document::StoredEntry;
use crate::embedder::GeminiEmbedder;
use crate::llm::{ChatModel, GeminiChat};
use crate::vector_store::{PgVectorStore, VectorStore};

/// Answer the model is instructed to give when the context is insufficient.
pub const REFUSAL: &str = "Não tenho informações necessárias para responder sua pergunta.";

/// Retrieves context for a question and asks the chat model to answer from it alone.
pub struct QaChain<S, M> {
    store: S,
    model: M,
    top_k: usize,
}

impl<S: VectorStore, M: ChatModel> QaChain<S, M> {
    /// Wires a store and a model; `top_k` entries are retrieved per question.
    pub fn new(store: S, model: M, top_k: usize) -> Self {
        Self {
            store,
            model,
            top_k: top_k.max(1),
        }
    }

    /// Retrieved context for `question`, joined the way it is placed in the prompt.
    pub fn context_for(&self, question: &str) -> Result<String> {
        let entries = self
            .store
            .similarity_search(question, self.top_k)
            .context("failed to retrieve context")?;
        debug!(retrieved = entries.len(), k = self.top_k, "retrieved context");
        Ok(format_docs(&entries))
    }

    /// Answers one question; every call is independent of the previous ones.
    pub fn invoke(&self, question: &str) -> Result<String> {
        let context = self.context_for(question)?;
        let prompt = render_prompt(&context, question);
        self.model
            .complete(&prompt)
            .context("chat model failed to answer")
    }
}

/// Joins entry contents with blank lines, preserving retrieval order.
pub fn format_docs(entries: &[StoredEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fills the answering template with the retrieved context and the user question.
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        r#"
CONTEXTO:
{context}

REGRAS:
- Responda somente com base no CONTEXTO.
- Se a informação não estiver explicitamente no CONTEXTO, responda:
  "{REFUSAL}"
- Nunca invente ou use conhecimento externo.
- Nunca produza opiniões ou interpretações além do que está escrito.

EXEMPLOS DE PERGUNTAS FORA DO CONTEXTO:
Pergunta: "Qual é a capital da França?"
Resposta: "{REFUSAL}"

Pergunta: "Quantos clientes temos em 2024?"
Resposta: "{REFUSAL}"

Pergunta: "Você acha isso bom ou ruim?"
Resposta: "{REFUSAL}"

PERGUNTA DO USUÁRIO:
{question}

RESPONDA A "PERGUNTA DO USUÁRIO"
"#
    )
}

/// Production chain: Gemini embeddings, pgvector retrieval, Gemini answers.
pub type PdfQaChain = QaChain<PgVectorStore<GeminiEmbedder>, GeminiChat>;

/// Builds every component of the production chain from settings.
pub fn build_chain(settings: &Settings) -> Result<PdfQaChain> {
    info!(model = %settings.embedding_model, "using embedding model");
    info!(model = %settings.chat_model, "using chat model");
    let embedder =
        GeminiEmbedder::from_settings(settings).context("failed to create embedding client")?;
    let store = PgVectorStore::connect(settings, embedder).context("failed to open vector store")?;
    let model = GeminiChat::from_settings(settings).context("failed to create chat model")?;
    info!(top_k = settings.top_k, "chat ready to receive questions");
    Ok(QaChain::new(store, model, settings.top_k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ContentRecord, Metadata};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    struct FixedStore {
        entries: Vec<StoredEntry>,
        requested_k: RefCell<Vec<usize>>,
    }

    impl FixedStore {
        fn with_contents(contents: &[&str]) -> Self {
            Self {
                entries: contents
                    .iter()
                    .enumerate()
                    .map(|(idx, content)| StoredEntry {
                        id: format!("doc-{idx}"),
                        content: content.to_string(),
                        metadata: Metadata::new(),
                    })
                    .collect(),
                requested_k: RefCell::new(Vec::new()),
            }
        }
    }

    impl VectorStore for FixedStore {
        fn add_documents(&mut self, records: &[ContentRecord], _ids: &[String]) -> Result<usize> {
            Ok(records.len())
        }

        fn similarity_search(&self, _query: &str, k: usize) -> Result<Vec<StoredEntry>> {
            self.requested_k.borrow_mut().push(k);
            Ok(self.entries.iter().take(k).cloned().collect())
        }
    }

    struct ScriptedModel {
        reply: String,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatModel for ScriptedModel {
        fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn retrieves_top_k_and_keeps_order_in_prompt() {
        let store = FixedStore::with_contents(&["first", "second", "third"]);
        let chain = QaChain::new(store, ScriptedModel::replying("ok"), 2);

        let answer = chain.invoke("Qual o faturamento?").expect("answer");
        assert_eq!(answer, "ok");
        assert_eq!(*chain.store.requested_k.borrow(), vec![2]);

        let prompts = chain.model.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("CONTEXTO:\nfirst\n\nsecond\n\nREGRAS:"));
        assert!(!prompts[0].contains("third"));
        assert!(prompts[0].contains("PERGUNTA DO USUÁRIO:\nQual o faturamento?\n"));
    }

    #[test]
    fn model_refusal_is_returned_verbatim() {
        let chain = QaChain::new(
            FixedStore::with_contents(&["unrelated"]),
            ScriptedModel::replying(REFUSAL),
            10,
        );
        assert_eq!(chain.invoke("Qual é a capital da França?").expect("answer"), REFUSAL);
    }

    #[test]
    fn empty_retrieval_still_asks_the_model() {
        let chain = QaChain::new(
            FixedStore::with_contents(&[]),
            ScriptedModel::replying(REFUSAL),
            10,
        );
        assert_eq!(chain.context_for("x").expect("context"), "");
        assert_eq!(chain.invoke("x").expect("answer"), REFUSAL);
        assert!(chain.model.prompts.borrow()[0].contains("CONTEXTO:\n\n\nREGRAS:"));
    }

    #[test]
    fn prompt_lists_the_refusal_rule_and_examples() {
        let prompt = render_prompt("ctx", "q");
        assert_eq!(prompt.matches(REFUSAL).count(), 4);
        assert!(prompt.starts_with("\nCONTEXTO:\nctx\n"));
        assert!(prompt.ends_with("RESPONDA A \"PERGUNTA DO USUÁRIO\"\n"));
    }

    #[test]
    fn format_docs_joins_with_blank_lines() {
        let store = FixedStore::with_contents(&["a", "b"]);
        assert_eq!(format_docs(&store.entries), "a\n\nb");
    }
}
