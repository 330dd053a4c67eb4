//! The parser seam and the trivial plaintext grammar.

use crate::ast::Syntax;
use crate::error::Result;
use crate::scanner::TemplateByteScanner;

/// Turns template bytes into syntax nodes.
///
/// Parsing is synchronous and pure: it consumes the whole input and either
/// returns the node list or the first error encountered.
pub trait TemplateParser: Send + Sync {
    fn parse(&self, scanner: &mut TemplateByteScanner) -> Result<Vec<Syntax>>;
}

impl<P: TemplateParser + ?Sized> TemplateParser for std::sync::Arc<P> {
    fn parse(&self, scanner: &mut TemplateByteScanner) -> Result<Vec<Syntax>> {
        (**self).parse(scanner)
    }
}

impl<P: TemplateParser + ?Sized> TemplateParser for Box<P> {
    fn parse(&self, scanner: &mut TemplateByteScanner) -> Result<Vec<Syntax>> {
        (**self).parse(scanner)
    }
}

/// Emits the whole buffer as a single raw node.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextParser;

impl TemplateParser for PlaintextParser {
    fn parse(&self, scanner: &mut TemplateByteScanner) -> Result<Vec<Syntax>> {
        let start = scanner.make_source_start();
        let begin = scanner.offset();
        while scanner.pop().is_some() {}
        let data = scanner.slice(begin..scanner.offset());
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Syntax::raw(data, scanner.make_source(start))])
    }
}
