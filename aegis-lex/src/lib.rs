#![forbid(unsafe_code)]

pub mod layout;
mod lexer;
mod token;

pub use layout::LayoutState;
pub use lexer::{DocComment, LexError, LexOutput, Lexer};
pub use token::{Token, TokenCategory, TokenKind};

#[cfg(test)]
mod tests {
	use super::*;

	fn kinds(src: &str) -> Vec<TokenKind> {
		let out = Lexer::new(src).lex();
		assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
		out.tokens.into_iter().map(|t| t.kind).collect()
	}

	fn count(kinds: &[TokenKind], k: &TokenKind) -> usize {
		kinds.iter().filter(|x| *x == k).count()
	}

	#[test]
	fn nested_blocks_balance() {
		let src = "module M:\n    fn f() -> int:\n        if true:\n            return 1\n        return 2\n";
		let ks = kinds(src);
		assert_eq!(count(&ks, &TokenKind::Indent), 3);
		assert_eq!(count(&ks, &TokenKind::Dedent), 3);
		assert_eq!(ks.last(), Some(&TokenKind::Eof));
	}

	#[test]
	fn blank_and_comment_lines_do_not_affect_layout() {
		let src = "module M:\n\n        # deeply indented comment\n    const A: int = 1\n## doc at column zero\n    const B: int = 2\n";
		let out = Lexer::new(src).lex();
		assert!(out.errors.is_empty());
		let ks: Vec<_> = out.tokens.iter().map(|t| t.kind.clone()).collect();
		assert_eq!(count(&ks, &TokenKind::Indent), 1);
		assert_eq!(out.doc_comments.len(), 1);
		assert_eq!(out.doc_comments[0].text, "doc at column zero");
	}

	#[test]
	fn inconsistent_dedent_is_reported_and_lexing_continues() {
		let src = "module M:\n    fn f():\n        print(\"a\")\n      print(\"b\")\n    fn g():\n        print(\"c\")\n";
		let out = Lexer::new(src).lex();
		assert_eq!(out.errors.len(), 1);
		assert!(out.errors[0].message.contains("inconsistent indentation"));
		let ks: Vec<_> = out.tokens.iter().map(|t| t.kind.clone()).collect();
		assert_eq!(count(&ks, &TokenKind::Indent), count(&ks, &TokenKind::Dedent));
		assert!(ks.contains(&TokenKind::Ident("g".into())));
	}

	#[test]
	fn mixed_tabs_and_spaces_are_lexical_errors() {
		let out = Lexer::new("module M:\n \tconst A: int = 1\n").lex();
		assert_eq!(out.errors.len(), 1);
		assert!(out.errors[0].message.contains("mixed"));
	}

	#[test]
	fn floats_need_a_fraction_and_ranges_still_lex() {
		let ks = kinds("let x = 3.25\nfor i in 1..5:\n    x\n");
		assert!(ks.contains(&TokenKind::Float(3.25)));
		assert!(ks.contains(&TokenKind::Int(1)));
		assert!(ks.contains(&TokenKind::DotDot));
		assert!(ks.contains(&TokenKind::Int(5)));

		let ks = kinds("let y = 3.foo\n");
		assert!(ks.contains(&TokenKind::Int(3)));
		assert!(ks.contains(&TokenKind::Dot));
	}

	#[test]
	fn integer_overflow_is_reported() {
		let out = Lexer::new("let x = 99999999999999999999\n").lex();
		assert_eq!(out.errors.len(), 1);
		assert!(out.errors[0].message.contains("out of range"));
	}

	#[test]
	fn strings_only_unescape_quotes() {
		let ks = kinds("let s = \"say \\\"hi\\\" \\n\"\n");
		assert!(ks.contains(&TokenKind::Str("say \"hi\" \\n".into())));
	}

	#[test]
	fn unterminated_string_and_stray_character_both_reported() {
		let out = Lexer::new("let a = \"oops\nlet b = 1 @ 2\n").lex();
		assert_eq!(out.errors.len(), 2);
		assert!(out.errors[0].message.contains("unterminated string"));
		assert!(out.errors[1].message.contains("unexpected character"));
	}

	#[test]
	fn block_comments_are_skipped_across_lines() {
		let ks = kinds("let a = 1 /* spans\n   several\n lines */\nlet b = 2\n");
		assert_eq!(count(&ks, &TokenKind::KwLet), 2);
		assert_eq!(count(&ks, &TokenKind::Indent), 0);

		let out = Lexer::new("let a = 1\n/* open\n").lex();
		assert!(out.errors.iter().any(|e| e.message.contains("block comment")));
	}

	#[test]
	fn brackets_continue_the_logical_line() {
		let ks = kinds("let x = f(1,\n        2)\nlet y = 3\n");
		assert_eq!(count(&ks, &TokenKind::Newline), 2);
		assert_eq!(count(&ks, &TokenKind::Indent), 0);
	}

	#[test]
	fn positions_are_line_and_column() {
		let out = Lexer::new("let a = 1\n  # c\nlet bb = 2\n").lex();
		let bb = out
			.tokens
			.iter()
			.find(|t| t.kind == TokenKind::Ident("bb".into()))
			.unwrap();
		assert_eq!((bb.pos.line, bb.pos.column), (3, 5));
		assert_eq!(bb.lexeme, "bb");
	}
}
