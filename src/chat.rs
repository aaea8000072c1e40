//! Terminal question loop.

use std::io::{self, BufRead, Write};

use tracing::error;

/// Word that ends the session, matched case-insensitively.
pub const EXIT_WORD: &str = "sair";

/// Runs the prompt loop until `sair` or end of input; returns how many questions were answered.
///
/// `answer` is called exactly once per non-empty question. Its errors are reported to the
/// user and the loop keeps going.
pub fn run_chat<R, W, F>(mut input: R, mut output: W, mut answer: F) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
    F: FnMut(&str) -> anyhow::Result<String>,
{
    writeln!(output, "--- Chat Iniciado ---")?;
    writeln!(output, "Digite \"{EXIT_WORD}\" para encerrar.")?;

    let mut answered = 0usize;
    let mut line = String::new();
    loop {
        write!(output, "\nFaça sua pergunta: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let question = line.trim();

        if question.eq_ignore_ascii_case(EXIT_WORD) {
            writeln!(output, "Encerrando o chat.")?;
            break;
        }
        if question.is_empty() {
            writeln!(output, "Por favor, digite uma pergunta.")?;
            continue;
        }

        match answer(question) {
            Ok(response) => {
                answered += 1;
                writeln!(output, "\nRESPOSTA: {response}")?;
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed to answer question");
                writeln!(output, "\nErro ao responder a pergunta: {err:#}")?;
            }
        }
    }
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn session(
        input: &str,
        mut answer: impl FnMut(&str) -> anyhow::Result<String>,
    ) -> (usize, String, Vec<String>) {
        let mut asked = Vec::new();
        let mut output = Vec::new();
        let answered = run_chat(Cursor::new(input.as_bytes()), &mut output, |q| {
            asked.push(q.to_string());
            answer(q)
        })
        .expect("chat loop");
        (answered, String::from_utf8(output).expect("utf8"), asked)
    }

    #[test]
    fn exit_word_stops_without_invoking() {
        let (answered, output, asked) = session("  SAIR \nnever asked\n", |_| Ok("x".into()));
        assert_eq!(answered, 0);
        assert!(asked.is_empty());
        assert!(output.starts_with("--- Chat Iniciado ---\nDigite \"sair\" para encerrar.\n"));
        assert!(output.ends_with("Encerrando o chat.\n"));
    }

    #[test]
    fn blank_lines_reprompt() {
        let (answered, output, asked) = session("\n   \nsair\n", |_| Ok("x".into()));
        assert_eq!(answered, 0);
        assert!(asked.is_empty());
        assert_eq!(output.matches("Por favor, digite uma pergunta.").count(), 2);
        assert_eq!(output.matches("Faça sua pergunta: ").count(), 3);
    }

    #[test]
    fn each_question_is_answered_once() {
        let (answered, output, asked) =
            session("Qual o prazo?\nE o valor?\nsair\n", |q| Ok(format!("eco: {q}")));
        assert_eq!(answered, 2);
        assert_eq!(asked, vec!["Qual o prazo?", "E o valor?"]);
        assert!(output.contains("\nRESPOSTA: eco: Qual o prazo?\n"));
        assert!(output.contains("\nRESPOSTA: eco: E o valor?\n"));
    }

    #[test]
    fn end_of_input_ends_the_session() {
        let (answered, _, asked) = session("pergunta", |_| Ok("ok".into()));
        assert_eq!(answered, 1);
        assert_eq!(asked, vec!["pergunta"]);
    }

    #[test]
    fn failures_are_reported_and_loop_continues() {
        let mut calls = 0;
        let (answered, output, asked) = session("a\nb\n", |_| {
            calls += 1;
            if calls == 1 {
                anyhow::bail!("quota exceeded")
            }
            Ok("fine".into())
        });
        assert_eq!(asked.len(), 2);
        assert_eq!(answered, 1);
        assert!(output.contains("quota exceeded"));
        assert!(output.contains("RESPOSTA: fine"));
    }
}
