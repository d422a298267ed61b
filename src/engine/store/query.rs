//! Query matching for the document store
//!
//! Two surfaces: [`Criteria`], a structured equality-conjunction predicate
//! used by `find_by`, and [`PathQuery`], a parsed path-expression escape
//! hatch for trusted callers. Criteria compile straight into the predicate
//! AST, never into query text, so field values can carry any characters
//! without being interpreted as query syntax.

use serde::{Deserialize, Serialize};

use crate::engine::xml::Element;

use super::error::{Result, StoreError};

/// Equality conjunction over record fields (case-sensitive, exact match)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Criteria {
    pairs: Vec<(String, String)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: &str) -> Self {
        self.push(field, value);
        self
    }

    pub fn push(&mut self, field: &str, value: &str) {
        self.pairs.push((field.to_string(), value.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Compile into the path-query AST: `//record` with one child-field
    /// predicate per pair.
    pub fn to_path_query(&self) -> PathQuery {
        let predicates = self
            .pairs
            .iter()
            .map(|(field, value)| Predicate::Child {
                name: "field".to_string(),
                predicates: vec![
                    Predicate::Attr {
                        name: "name".to_string(),
                        value: field.clone(),
                    },
                    Predicate::Text(value.clone()),
                ],
            })
            .collect();

        PathQuery {
            steps: vec![Step {
                descendant: true,
                name: NameTest::Name("record".to_string()),
                predicates,
            }],
        }
    }
}

/// A parsed path expression: `/` and `//` steps with `[@attr='v']`,
/// `[text()='v']`, and nested child-element predicates joined by `and`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathQuery {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    /// `//` (any descendant) vs `/` (direct child)
    descendant: bool,
    name: NameTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
enum NameTest {
    Any,
    Name(String),
}

impl NameTest {
    fn matches(&self, element: &Element) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Name(n) => element.name == *n,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    /// `@name='value'`
    Attr { name: String, value: String },
    /// `text()='value'`
    Text(String),
    /// `child[...]` existence test with its own predicates
    Child {
        name: String,
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    fn matches(&self, element: &Element) -> bool {
        match self {
            Predicate::Attr { name, value } => element.attr(name) == Some(value.as_str()),
            Predicate::Text(value) => element.text == *value,
            Predicate::Child { name, predicates } => element
                .children_named(name)
                .any(|child| predicates.iter().all(|p| p.matches(child))),
        }
    }
}

impl PathQuery {
    /// Parse a raw path expression. Malformed input is an `InvalidInput`
    /// error; the expression itself is trusted and not sanitized.
    pub fn parse(input: &str) -> Result<Self> {
        QueryParser::new(input).parse()
    }

    /// Evaluate against a tree, returning matches in document order.
    pub fn evaluate<'a>(&self, root: &'a Element) -> Vec<&'a Element> {
        let mut context: Vec<&Element> = Vec::new();

        for (i, step) in self.steps.iter().enumerate() {
            let candidates: Vec<&Element> = if i == 0 {
                // First step starts from the (virtual) document node: the
                // root element is its only child and also a descendant.
                if step.descendant {
                    let mut all = vec![root];
                    all.extend(descendants(root));
                    all
                } else {
                    vec![root]
                }
            } else {
                let mut all = Vec::new();
                for node in &context {
                    if step.descendant {
                        all.extend(descendants(node));
                    } else {
                        all.extend(node.children.iter());
                    }
                }
                all
            };

            let mut next: Vec<&Element> = Vec::new();
            for node in candidates {
                if step.name.matches(node)
                    && step.predicates.iter().all(|p| p.matches(node))
                    && !next.iter().any(|e| std::ptr::eq(*e, node))
                {
                    next.push(node);
                }
            }
            context = next;
        }

        context
    }
}

fn descendants(el: &Element) -> Vec<&Element> {
    let mut out = Vec::new();
    for child in &el.children {
        out.push(child);
        out.extend(descendants(child));
    }
    out
}

struct QueryParser {
    chars: Vec<char>,
    pos: usize,
}

impl QueryParser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.trim().chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<PathQuery> {
        let mut steps = Vec::new();
        while self.peek().is_some() {
            steps.push(self.parse_step()?);
        }
        if steps.is_empty() {
            return Err(StoreError::InvalidInput("empty query".to_string()));
        }
        Ok(PathQuery { steps })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn fail(&self, message: &str) -> StoreError {
        StoreError::InvalidInput(format!("query position {}: {}", self.pos, message))
    }

    fn parse_step(&mut self) -> Result<Step> {
        if !self.eat('/') {
            return Err(self.fail("expected '/'"));
        }
        let descendant = self.eat('/');

        let name = if self.eat('*') {
            NameTest::Any
        } else {
            NameTest::Name(self.parse_name()?)
        };

        let mut predicates = Vec::new();
        while self.peek() == Some('[') {
            predicates.extend(self.parse_predicate_list()?);
        }

        Ok(Step {
            descendant,
            name,
            predicates,
        })
    }

    fn parse_name(&mut self) -> Result<String> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.fail("expected a name"));
        }
        Ok(name)
    }

    /// `[expr and expr and ...]`
    fn parse_predicate_list(&mut self) -> Result<Vec<Predicate>> {
        self.eat('[');
        let mut predicates = Vec::new();
        loop {
            self.skip_whitespace();
            predicates.push(self.parse_predicate_expr()?);
            self.skip_whitespace();
            if self.eat(']') {
                return Ok(predicates);
            }
            for expected in ['a', 'n', 'd'] {
                if self.bump() != Some(expected) {
                    return Err(self.fail("expected 'and' or ']'"));
                }
            }
        }
    }

    fn parse_predicate_expr(&mut self) -> Result<Predicate> {
        if self.eat('@') {
            let name = self.parse_name()?;
            self.parse_eq()?;
            let value = self.parse_quoted()?;
            return Ok(Predicate::Attr { name, value });
        }

        let name = self.parse_name()?;
        self.skip_whitespace();

        if name == "text" && self.eat('(') {
            if !self.eat(')') {
                return Err(self.fail("expected ')'"));
            }
            self.parse_eq()?;
            let value = self.parse_quoted()?;
            return Ok(Predicate::Text(value));
        }

        // Nested child test: name[...]...
        let mut predicates = Vec::new();
        while self.peek() == Some('[') {
            predicates.extend(self.parse_predicate_list()?);
        }
        Ok(Predicate::Child { name, predicates })
    }

    fn parse_eq(&mut self) -> Result<()> {
        self.skip_whitespace();
        if !self.eat('=') {
            return Err(self.fail("expected '='"));
        }
        self.skip_whitespace();
        Ok(())
    }

    fn parse_quoted(&mut self) -> Result<String> {
        let quote = match self.bump() {
            Some(c @ ('\'' | '"')) => c,
            _ => return Err(self.fail("expected a quoted value")),
        };
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.fail("unterminated quoted value")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::xml::parse_document;

    fn sample_tree() -> Element {
        parse_document(
            r#"<audit-database version="1.0">
  <records>
    <record id="A1"><field name="gender">female</field><field name="primary-diagnosis">breast-cancer</field></record>
    <record id="A2"><field name="gender">male</field><field name="primary-diagnosis">breast-cancer</field></record>
    <record id="A3"><field name="gender">female</field><field name="primary-diagnosis">lymphoma</field></record>
  </records>
</audit-database>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_and_evaluate_by_id() {
        let tree = sample_tree();
        let query = PathQuery::parse("//record[@id='A2']").unwrap();
        let matches = query.evaluate(&tree);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].attr("id"), Some("A2"));
    }

    #[test]
    fn test_criteria_conjunction() {
        let tree = sample_tree();
        let criteria = Criteria::new()
            .with("gender", "female")
            .with("primary-diagnosis", "breast-cancer");
        let matches = criteria.to_path_query().evaluate(&tree);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].attr("id"), Some("A1"));
    }

    #[test]
    fn test_criteria_value_with_query_syntax_does_not_inject() {
        let tree = parse_document(
            r#"<db><records>
  <record id="X1"><field name="note">'] | //record['1'='1</field></record>
  <record id="X2"><field name="note">plain</field></record>
</records></db>"#,
        )
        .unwrap();

        // The hostile value must only ever match as literal text.
        let hostile = Criteria::new().with("note", "'] | //record['1'='1");
        assert_eq!(hostile.to_path_query().evaluate(&tree).len(), 1);

        let plain = Criteria::new().with("note", "plain");
        let matches = plain.to_path_query().evaluate(&tree);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].attr("id"), Some("X2"));
    }

    #[test]
    fn test_nested_child_predicate_expression() {
        let tree = sample_tree();
        let query =
            PathQuery::parse("//record[field[@name='gender' and text()='female']]").unwrap();
        assert_eq!(query.evaluate(&tree).len(), 2);
    }

    #[test]
    fn test_absolute_child_path() {
        let tree = sample_tree();
        let query = PathQuery::parse("/audit-database/records/record").unwrap();
        assert_eq!(query.evaluate(&tree).len(), 3);
    }

    #[test]
    fn test_wildcard_step() {
        let tree = sample_tree();
        let query = PathQuery::parse("//records/*[@id='A3']").unwrap();
        assert_eq!(query.evaluate(&tree).len(), 1);
    }

    #[test]
    fn test_malformed_query_is_invalid_input() {
        assert!(matches!(
            PathQuery::parse("record[@id"),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            PathQuery::parse(""),
            Err(StoreError::InvalidInput(_))
        ));
    }
}
