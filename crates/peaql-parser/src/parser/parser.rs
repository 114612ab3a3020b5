//! PeaQL parser implementation.

use super::error::ParseError;
use super::pratt::{
    infix_binding_power, postfix_binding_power, prefix_binding_power, token_to_binary_op,
    token_to_unary_op, COMPARISON_BP,
};
use crate::ast::{
    BinaryOp, ColumnDef, CompoundSelect, CreateTable, Cte, Delete, Expr, FrameBound,
    FrameExclusion, FrameUnits, FunctionCall, InList, Insert, InsertSource, Join, JoinConstraint,
    JoinType, Literal, NullOrdering, OrderBy, OrderDirection, Query, Select, SelectItem, SetOp,
    Statement, TableConstraint, TableRef, Update, WindowFrame, WindowSpec,
};
use crate::lexer::{Keyword, Lexer, LexerOptions, QuoteStyle, Span, Token, TokenKind};

/// How delimited identifiers resolve in expression position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierQuoting {
    /// Every quoting style is an identifier; unresolvable names fall back to
    /// string literals at compile time.
    #[default]
    Auto,
    /// Only `"name"` is an identifier; other styles are string literals.
    Quoted,
    /// Only `` `name` `` is an identifier.
    Backtick,
    /// Only `[name]` is an identifier.
    Bracket,
}

impl IdentifierQuoting {
    /// Parses a setting value, e.g. from `SET identifier_quoting = backtick`.
    #[must_use]
    pub fn from_setting(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "quoted" => Some(Self::Quoted),
            "backtick" => Some(Self::Backtick),
            "bracket" => Some(Self::Bracket),
            _ => None,
        }
    }
}

/// Parser configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserOptions {
    /// Active identifier-quoting mode.
    pub quoting: IdentifierQuoting,
}

/// The result of parsing a script: every statement that parsed, plus every
/// error collected along the way (the parser resynchronizes at `;`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    /// Successfully parsed statements, in textual order.
    pub statements: Vec<Statement>,
    /// All parse errors encountered.
    pub errors: Vec<ParseError>,
}

/// PeaQL parser: recursive descent with Pratt expression parsing.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    /// Running count of `?` placeholders, for 1-based positions.
    param_counter: usize,
    quoting: IdentifierQuoting,
}

type Result<T> = core::result::Result<T, ParseError>;

impl<'a> Parser<'a> {
    /// Creates a parser with default options.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self::with_options(input, ParserOptions::default())
    }

    /// Creates a parser with explicit options.
    #[must_use]
    pub fn with_options(input: &'a str, options: ParserOptions) -> Self {
        let lexer_options = LexerOptions {
            bracket_identifiers: options.quoting == IdentifierQuoting::Bracket,
        };
        let mut lexer = Lexer::with_options(input, lexer_options);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            previous: Token::new(TokenKind::Eof, Span::new(0, 0)),
            param_counter: 0,
            quoting: options.quoting,
        }
    }

    /// Parses an entire script: statements separated by `;`.
    ///
    /// Errors do not abort the scan; the parser records them and skips to
    /// the next statement boundary so every error in the text is surfaced.
    #[must_use]
    pub fn parse_script(mut self) -> Script {
        let mut script = Script::default();

        loop {
            while self.check(&TokenKind::Semicolon) {
                self.advance();
            }
            if self.current.is_eof() {
                break;
            }
            match self.parse_statement() {
                Ok(statement) => {
                    script.statements.push(statement);
                    if !self.current.is_eof() && !self.check(&TokenKind::Semicolon) {
                        script.errors.push(ParseError::unexpected(
                            "';' or end of input",
                            self.current.kind.clone(),
                            self.current.span,
                        ));
                        self.synchronize();
                    }
                }
                Err(error) => {
                    script.errors.push(error);
                    self.synchronize();
                }
            }
        }

        script
    }

    /// Parses a single statement.
    pub fn parse_statement(&mut self) -> Result<Statement> {
        match &self.current.kind {
            TokenKind::Keyword(Keyword::Select | Keyword::With) => {
                Ok(Statement::Query(Box::new(self.parse_query()?)))
            }
            TokenKind::Keyword(Keyword::Create) => self.parse_create_table(),
            TokenKind::Keyword(Keyword::Drop) => self.parse_drop_table(),
            TokenKind::Keyword(Keyword::Insert) => self.parse_insert(),
            TokenKind::Keyword(Keyword::Update) => self.parse_update(),
            TokenKind::Keyword(Keyword::Delete) => self.parse_delete(),
            TokenKind::Keyword(Keyword::Set) => self.parse_set(),
            _ => Err(ParseError::unexpected(
                "SELECT, WITH, CREATE, DROP, INSERT, UPDATE, DELETE or SET",
                self.current.kind.clone(),
                self.current.span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn advance(&mut self) {
        self.previous = core::mem::replace(&mut self.current, self.lexer.next_token());
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current.kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.current.kind, TokenKind::Keyword(k) if k == keyword)
    }

    /// Consumes the keyword if present.
    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::unexpected(
                what,
                self.current.kind.clone(),
                self.current.span,
            ))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(ParseError::unexpected(
                format!("{keyword:?}").to_uppercase(),
                self.current.kind.clone(),
                self.current.span,
            ))
        }
    }

    /// Consumes an identifier. Delimited identifiers are accepted regardless
    /// of the quoting mode here; the mode only affects expression position.
    fn expect_identifier(&mut self) -> Result<String> {
        match &self.current.kind {
            TokenKind::Identifier(name) | TokenKind::Quoted(name, _) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(ParseError::unexpected(
                "identifier",
                self.current.kind.clone(),
                self.current.span,
            )),
        }
    }

    /// Skips to the next statement boundary after an error.
    fn synchronize(&mut self) {
        while !self.current.is_eof() && !self.check(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Parses a full query: `[WITH …] select {UNION|…} [ORDER BY] [LIMIT]`.
    pub fn parse_query(&mut self) -> Result<Query> {
        let mut with = Vec::new();
        if self.eat_keyword(Keyword::With) {
            loop {
                let name = self.expect_identifier()?;
                self.expect_keyword(Keyword::As)?;
                self.expect(&TokenKind::LeftParen, "'('")?;
                let query = self.parse_query()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                with.push(Cte {
                    name,
                    query: Box::new(query),
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let select = self.parse_select_core()?;

        let mut compounds = Vec::new();
        loop {
            let op = match &self.current.kind {
                TokenKind::Keyword(Keyword::Union) => SetOp::Union,
                TokenKind::Keyword(Keyword::Intersect) => SetOp::Intersect,
                TokenKind::Keyword(Keyword::Except) => SetOp::Except,
                _ => break,
            };
            self.advance();
            let all = self.eat_keyword(Keyword::All);
            let select = self.parse_select_core()?;
            compounds.push(CompoundSelect { op, all, select });
        }

        let order_by = if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            self.parse_order_by_list()?
        } else {
            Vec::new()
        };

        let limit = if self.eat_keyword(Keyword::Limit) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        let offset = if self.eat_keyword(Keyword::Offset) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        Ok(Query {
            with,
            select,
            compounds,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_select_core(&mut self) -> Result<Select> {
        self.expect_keyword(Keyword::Select)?;

        let distinct = if self.eat_keyword(Keyword::Distinct) {
            true
        } else {
            self.eat_keyword(Keyword::All);
            false
        };

        let targets = self.parse_select_items()?;

        let mut joins = Vec::new();
        let from = if self.eat_keyword(Keyword::From) {
            let first = self.parse_table_ref()?;
            // Comma-separated relations are CROSS joins on literal TRUE.
            while self.eat(&TokenKind::Comma) {
                let table = self.parse_table_ref()?;
                joins.push(Join {
                    join_type: JoinType::Cross,
                    table,
                    constraint: JoinConstraint::None,
                });
            }
            Some(first)
        } else {
            None
        };

        while let Some(join_type) = self.parse_join_type()? {
            let table = self.parse_table_ref()?;
            let constraint = if self.eat_keyword(Keyword::On) {
                JoinConstraint::On(self.parse_expression(0)?)
            } else if self.eat_keyword(Keyword::Using) {
                self.expect(&TokenKind::LeftParen, "'('")?;
                let mut columns = vec![self.expect_identifier()?];
                while self.eat(&TokenKind::Comma) {
                    columns.push(self.expect_identifier()?);
                }
                self.expect(&TokenKind::RightParen, "')'")?;
                JoinConstraint::Using(columns)
            } else {
                JoinConstraint::None
            };
            joins.push(Join {
                join_type,
                table,
                constraint,
            });
        }

        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        let group_by = if self.check_keyword(Keyword::Group) {
            self.advance();
            self.expect_keyword(Keyword::By)?;
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        let having = if self.eat_keyword(Keyword::Having) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        let mut windows = Vec::new();
        if self.eat_keyword(Keyword::Window) {
            loop {
                let name = self.expect_identifier()?;
                self.expect_keyword(Keyword::As)?;
                self.expect(&TokenKind::LeftParen, "'('")?;
                let spec = self.parse_window_spec()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                windows.push((name, spec));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let pivot_by = if self.eat_keyword(Keyword::Pivot) {
            self.expect_keyword(Keyword::By)?;
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        Ok(Select {
            distinct,
            targets,
            from,
            joins,
            where_clause,
            group_by,
            having,
            windows,
            pivot_by,
        })
    }

    /// Parses a leading join-type keyword sequence, if one is present.
    fn parse_join_type(&mut self) -> Result<Option<JoinType>> {
        let join_type = match &self.current.kind {
            TokenKind::Keyword(Keyword::Join) => {
                self.advance();
                return Ok(Some(JoinType::Inner));
            }
            TokenKind::Keyword(Keyword::Inner) => JoinType::Inner,
            TokenKind::Keyword(Keyword::Left) => JoinType::Left,
            TokenKind::Keyword(Keyword::Right) => JoinType::Right,
            TokenKind::Keyword(Keyword::Full) => JoinType::Full,
            TokenKind::Keyword(Keyword::Cross) => JoinType::Cross,
            TokenKind::Keyword(Keyword::Anti) => JoinType::Anti,
            _ => return Ok(None),
        };
        self.advance();
        self.eat_keyword(Keyword::Outer);
        self.expect_keyword(Keyword::Join)?;
        Ok(Some(join_type))
    }

    fn parse_select_items(&mut self) -> Result<Vec<SelectItem>> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expression(0)?;
            let alias = self.parse_alias();
            items.push(SelectItem { expr, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    /// Parses `AS name` or a bare trailing identifier alias.
    fn parse_alias(&mut self) -> Option<String> {
        if self.eat_keyword(Keyword::As) {
            return self.expect_identifier().ok();
        }
        match &self.current.kind {
            TokenKind::Identifier(name) | TokenKind::Quoted(name, _) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        }
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        if self.eat(&TokenKind::LeftParen) {
            let query = self.parse_query()?;
            self.expect(&TokenKind::RightParen, "')'")?;
            let alias = self.parse_alias();
            return Ok(TableRef::Subquery {
                query: Box::new(query),
                alias,
            });
        }

        let span = self.current.span;
        let name = self.expect_identifier()?;
        let alias = self.parse_alias();
        Ok(TableRef::Named { name, alias, span })
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderBy>> {
        let mut list = Vec::new();
        loop {
            let expr = self.parse_expression(0)?;
            let direction = if self.eat_keyword(Keyword::Desc) {
                OrderDirection::Desc
            } else {
                self.eat_keyword(Keyword::Asc);
                OrderDirection::Asc
            };
            let nulls = if self.eat_keyword(Keyword::Nulls) {
                if self.eat_keyword(Keyword::First) {
                    Some(NullOrdering::First)
                } else {
                    self.expect_keyword(Keyword::Last)?;
                    Some(NullOrdering::Last)
                }
            } else {
                None
            };
            list.push(OrderBy {
                expr,
                direction,
                nulls,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(list)
    }

    fn parse_expression_list(&mut self) -> Result<Vec<Expr>> {
        let mut list = vec![self.parse_expression(0)?];
        while self.eat(&TokenKind::Comma) {
            list.push(self.parse_expression(0)?);
        }
        Ok(list)
    }

    // ------------------------------------------------------------------
    // Windows
    // ------------------------------------------------------------------

    /// Parses the inside of `OVER ( … )` / `WINDOW w AS ( … )`:
    /// `[base] [PARTITION BY …] [ORDER BY …] [frame]`.
    fn parse_window_spec(&mut self) -> Result<WindowSpec> {
        let mut spec = WindowSpec::default();

        if let TokenKind::Identifier(name) = &self.current.kind {
            spec.base = Some(name.clone());
            self.advance();
        }

        if self.check_keyword(Keyword::Partition) {
            self.advance();
            self.expect_keyword(Keyword::By)?;
            spec.partition_by = self.parse_expression_list()?;
        }

        if self.check_keyword(Keyword::Order) {
            self.advance();
            self.expect_keyword(Keyword::By)?;
            spec.order_by = self.parse_order_by_list()?;
        }

        if matches!(
            self.current.kind,
            TokenKind::Keyword(Keyword::Rows | Keyword::Groups | Keyword::Range)
        ) {
            spec.frame = Some(self.parse_window_frame()?);
        }

        Ok(spec)
    }

    fn parse_window_frame(&mut self) -> Result<WindowFrame> {
        let units = match &self.current.kind {
            TokenKind::Keyword(Keyword::Rows) => FrameUnits::Rows,
            TokenKind::Keyword(Keyword::Groups) => FrameUnits::Groups,
            TokenKind::Keyword(Keyword::Range) => FrameUnits::Range,
            _ => {
                return Err(ParseError::unexpected(
                    "ROWS, GROUPS or RANGE",
                    self.current.kind.clone(),
                    self.current.span,
                ))
            }
        };
        self.advance();

        let (start, end) = if self.eat_keyword(Keyword::Between) {
            let start = self.parse_frame_bound()?;
            self.expect_keyword(Keyword::And)?;
            let end = self.parse_frame_bound()?;
            (start, end)
        } else {
            (self.parse_frame_bound()?, FrameBound::CurrentRow)
        };

        let exclude = if self.eat_keyword(Keyword::Exclude) {
            if self.eat_keyword(Keyword::No) {
                self.expect_keyword(Keyword::Others)?;
                FrameExclusion::NoOthers
            } else if self.eat_keyword(Keyword::Current) {
                self.expect_keyword(Keyword::Row)?;
                FrameExclusion::CurrentRow
            } else if self.eat_keyword(Keyword::Group) {
                FrameExclusion::Group
            } else {
                self.expect_keyword(Keyword::Ties)?;
                FrameExclusion::Ties
            }
        } else {
            FrameExclusion::NoOthers
        };

        Ok(WindowFrame {
            units,
            start,
            end,
            exclude,
        })
    }

    fn parse_frame_bound(&mut self) -> Result<FrameBound> {
        if self.eat_keyword(Keyword::Unbounded) {
            if self.eat_keyword(Keyword::Preceding) {
                return Ok(FrameBound::UnboundedPreceding);
            }
            self.expect_keyword(Keyword::Following)?;
            return Ok(FrameBound::UnboundedFollowing);
        }
        if self.eat_keyword(Keyword::Current) {
            self.expect_keyword(Keyword::Row)?;
            return Ok(FrameBound::CurrentRow);
        }
        let offset = self.parse_expression(COMPARISON_BP)?;
        if self.eat_keyword(Keyword::Preceding) {
            Ok(FrameBound::Preceding(offset))
        } else {
            self.expect_keyword(Keyword::Following)?;
            Ok(FrameBound::Following(offset))
        }
    }

    // ------------------------------------------------------------------
    // DDL / DML
    // ------------------------------------------------------------------

    fn parse_create_table(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Create)?;
        self.expect_keyword(Keyword::Table)?;

        let if_not_exists = if self.eat_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Not)?;
            // EXISTS is a reserved word in this dialect.
            self.expect_keyword(Keyword::Exists)?;
            true
        } else {
            false
        };

        let span = self.current.span;
        let name = self.expect_identifier()?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        if self.eat(&TokenKind::LeftParen) {
            loop {
                if matches!(
                    self.current.kind,
                    TokenKind::Keyword(
                        Keyword::Constraint
                            | Keyword::Check
                            | Keyword::Unique
                            | Keyword::Primary
                            | Keyword::Foreign
                    )
                ) {
                    constraints.push(self.parse_table_constraint()?);
                } else {
                    columns.push(self.parse_column_def()?);
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RightParen, "')'")?;
        }

        let as_query = if self.eat_keyword(Keyword::As) {
            Some(Box::new(self.parse_query()?))
        } else {
            None
        };

        if columns.is_empty() && as_query.is_none() {
            return Err(ParseError::new(
                "CREATE TABLE requires a column list or AS <query>",
                span,
            ));
        }

        Ok(Statement::CreateTable(CreateTable {
            name,
            if_not_exists,
            columns,
            constraints,
            as_query,
            span,
        }))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_identifier()?;
        let type_name = self.expect_identifier()?;
        let mut def = ColumnDef::new(name, type_name);

        if self.eat(&TokenKind::LeftBracket) {
            self.expect(&TokenKind::RightBracket, "']'")?;
            def.is_array = true;
        }

        loop {
            if self.eat_keyword(Keyword::Not) {
                self.expect_keyword(Keyword::Null)?;
                def.not_null = true;
            } else if self.eat_keyword(Keyword::Default) {
                def.default = Some(self.parse_expression(COMPARISON_BP)?);
            } else if self.eat_keyword(Keyword::Check) {
                self.expect(&TokenKind::LeftParen, "'('")?;
                def.check = Some(self.parse_expression(0)?);
                self.expect(&TokenKind::RightParen, "')'")?;
            } else if self.eat_keyword(Keyword::Primary) {
                self.expect_keyword(Keyword::Key)?;
                def.primary_key = true;
            } else if self.eat_keyword(Keyword::Unique) {
                def.unique = true;
            } else {
                break;
            }
        }

        Ok(def)
    }

    fn parse_table_constraint(&mut self) -> Result<TableConstraint> {
        let name = if self.eat_keyword(Keyword::Constraint) {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        if self.eat_keyword(Keyword::Check) {
            self.expect(&TokenKind::LeftParen, "'('")?;
            let expr = self.parse_expression(0)?;
            self.expect(&TokenKind::RightParen, "')'")?;
            return Ok(TableConstraint::Check { name, expr });
        }
        if self.eat_keyword(Keyword::Unique) {
            let columns = self.parse_paren_identifiers()?;
            return Ok(TableConstraint::Unique { name, columns });
        }
        if self.eat_keyword(Keyword::Primary) {
            self.expect_keyword(Keyword::Key)?;
            let columns = self.parse_paren_identifiers()?;
            return Ok(TableConstraint::PrimaryKey { name, columns });
        }
        self.expect_keyword(Keyword::Foreign)?;
        self.expect_keyword(Keyword::Key)?;
        let columns = self.parse_paren_identifiers()?;
        self.expect_keyword(Keyword::References)?;
        let ref_table = self.expect_identifier()?;
        let ref_columns = if self.check(&TokenKind::LeftParen) {
            self.parse_paren_identifiers()?
        } else {
            Vec::new()
        };
        Ok(TableConstraint::ForeignKey {
            name,
            columns,
            ref_table,
            ref_columns,
        })
    }

    fn parse_paren_identifiers(&mut self) -> Result<Vec<String>> {
        self.expect(&TokenKind::LeftParen, "'('")?;
        let mut names = vec![self.expect_identifier()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }
        self.expect(&TokenKind::RightParen, "')'")?;
        Ok(names)
    }

    fn parse_drop_table(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Drop)?;
        self.expect_keyword(Keyword::Table)?;
        let if_exists = if self.eat_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Exists)?;
            true
        } else {
            false
        };
        let span = self.current.span;
        let name = self.expect_identifier()?;
        Ok(Statement::DropTable {
            name,
            if_exists,
            span,
        })
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let span = self.current.span;
        let table = self.expect_identifier()?;

        let columns = if self.check(&TokenKind::LeftParen) {
            self.parse_paren_identifiers()?
        } else {
            Vec::new()
        };

        let source = if self.eat_keyword(Keyword::Values) {
            let mut rows = Vec::new();
            loop {
                self.expect(&TokenKind::LeftParen, "'('")?;
                let row = self.parse_expression_list()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                rows.push(row);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else {
            InsertSource::Query(Box::new(self.parse_query()?))
        };

        let returning = self.parse_returning()?;

        Ok(Statement::Insert(Insert {
            table,
            columns,
            source,
            returning,
            span,
        }))
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Update)?;
        let span = self.current.span;
        let table = self.expect_identifier()?;
        self.expect_keyword(Keyword::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier()?;
            self.expect(&TokenKind::Eq, "'='")?;
            let value = self.parse_expression(0)?;
            assignments.push((column, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        let returning = self.parse_returning()?;

        Ok(Statement::Update(Update {
            table,
            assignments,
            where_clause,
            returning,
            span,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Delete)?;
        self.expect_keyword(Keyword::From)?;
        let span = self.current.span;
        let table = self.expect_identifier()?;
        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        let returning = self.parse_returning()?;
        Ok(Statement::Delete(Delete {
            table,
            where_clause,
            returning,
            span,
        }))
    }

    fn parse_returning(&mut self) -> Result<Vec<SelectItem>> {
        if self.eat_keyword(Keyword::Returning) {
            self.parse_select_items()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_set(&mut self) -> Result<Statement> {
        self.expect_keyword(Keyword::Set)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Eq, "'='")?;
        let value = self.parse_expression(0)?;
        Ok(Statement::Set { name, value })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Parses an expression with the given minimum binding power.
    pub fn parse_expression(&mut self, min_bp: u8) -> Result<Expr> {
        if prefix_binding_power(&self.current.kind).is_none() {
            return Err(ParseError::unexpected(
                "expression",
                self.current.kind.clone(),
                self.current.span,
            ));
        }

        let mut lhs = self.parse_prefix()?;

        loop {
            // Tightest first: postfix `.`, `[`, `::`.
            if let Some(bp) = postfix_binding_power(&self.current.kind) {
                if bp < min_bp {
                    break;
                }
                lhs = self.parse_postfix(lhs)?;
                continue;
            }

            let Some((left_bp, right_bp)) = infix_binding_power(&self.current.kind) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }

            lhs = self.parse_infix(lhs, right_bp)?;
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let span = self.current.span;
        match self.current.kind.clone() {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Integer(value)))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(value)))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(value)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false)))
            }
            TokenKind::Keyword(Keyword::Case) => self.parse_case(),
            TokenKind::Keyword(Keyword::Exists) => {
                self.advance();
                self.expect(&TokenKind::LeftParen, "'('")?;
                let query = self.parse_query()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                Ok(Expr::Exists(Box::new(query)))
            }
            kind @ (TokenKind::Minus | TokenKind::Keyword(Keyword::Not)) => {
                self.advance();
                let (op, bp) = match token_to_unary_op(&kind) {
                    Some(op @ crate::ast::UnaryOp::Neg) => (op, 13),
                    Some(op) => (op, 5),
                    None => {
                        return Err(ParseError::unexpected("unary operator", kind, span));
                    }
                };
                let operand = self.parse_expression(bp)?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Star => {
                self.advance();
                Ok(Expr::Wildcard { table: None })
            }
            TokenKind::Placeholder => {
                self.advance();
                self.param_counter += 1;
                Ok(Expr::Parameter {
                    name: None,
                    position: self.param_counter,
                    span,
                })
            }
            TokenKind::Colon => {
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Expr::Parameter {
                    name: Some(name),
                    position: 0,
                    span: span.merge(self.previous.span),
                })
            }
            TokenKind::LeftParen => {
                self.advance();
                if matches!(
                    self.current.kind,
                    TokenKind::Keyword(Keyword::Select | Keyword::With)
                ) {
                    let query = self.parse_query()?;
                    self.expect(&TokenKind::RightParen, "')'")?;
                    return Ok(Expr::Subquery(Box::new(query)));
                }
                let first = self.parse_expression(0)?;
                if self.eat(&TokenKind::Comma) {
                    let mut items = vec![first];
                    loop {
                        items.push(self.parse_expression(0)?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RightParen, "')'")?;
                    Ok(Expr::Tuple(items))
                } else {
                    self.expect(&TokenKind::RightParen, "')'")?;
                    Ok(first)
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    items = self.parse_expression_list()?;
                }
                self.expect(&TokenKind::RightBracket, "']'")?;
                Ok(Expr::Array(items))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    let call = self.parse_function_call(name, span)?;
                    Ok(Expr::Function(Box::new(call)))
                } else {
                    Ok(Expr::Column {
                        table: None,
                        name,
                        quoted: false,
                        span,
                    })
                }
            }
            TokenKind::Quoted(name, style) => {
                self.advance();
                let is_identifier = match self.quoting {
                    IdentifierQuoting::Auto => true,
                    IdentifierQuoting::Quoted => style == QuoteStyle::Double,
                    IdentifierQuoting::Backtick => style == QuoteStyle::Backtick,
                    IdentifierQuoting::Bracket => style == QuoteStyle::Bracket,
                };
                if is_identifier {
                    Ok(Expr::Column {
                        table: None,
                        name,
                        quoted: self.quoting == IdentifierQuoting::Auto,
                        span,
                    })
                } else {
                    Ok(Expr::Literal(Literal::String(name)))
                }
            }
            other => Err(ParseError::unexpected("expression", other, span)),
        }
    }

    /// Parses function-call syntax after the name: `(args) [FILTER] [OVER]`.
    fn parse_function_call(&mut self, name: String, span: Span) -> Result<FunctionCall> {
        self.expect(&TokenKind::LeftParen, "'('")?;

        let distinct = self.eat_keyword(Keyword::Distinct);
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            args = self.parse_expression_list()?;
        }
        self.expect(&TokenKind::RightParen, "')'")?;

        let filter = if self.check_keyword(Keyword::Filter) {
            self.advance();
            self.expect(&TokenKind::LeftParen, "'('")?;
            self.expect_keyword(Keyword::Where)?;
            let predicate = self.parse_expression(0)?;
            self.expect(&TokenKind::RightParen, "')'")?;
            Some(Box::new(predicate))
        } else {
            None
        };

        let over = if self.eat_keyword(Keyword::Over) {
            if self.eat(&TokenKind::LeftParen) {
                let spec = self.parse_window_spec()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                Some(spec)
            } else {
                let base = self.expect_identifier()?;
                Some(WindowSpec {
                    base: Some(base),
                    ..WindowSpec::default()
                })
            }
        } else {
            None
        };

        Ok(FunctionCall {
            name,
            args,
            distinct,
            filter,
            over,
            span: span.merge(self.previous.span),
        })
    }

    /// Parses one postfix operator: `.name`, `.name(args)`, `.*`,
    /// `[index]`, `::type`.
    fn parse_postfix(&mut self, lhs: Expr) -> Result<Expr> {
        match &self.current.kind {
            TokenKind::Dot => {
                self.advance();
                if self.eat(&TokenKind::Star) {
                    return match lhs {
                        Expr::Column {
                            table: None, name, ..
                        } => Ok(Expr::Wildcard { table: Some(name) }),
                        _ => Err(ParseError::new(
                            "'.*' requires a plain table name",
                            self.previous.span,
                        )),
                    };
                }
                let span = self.current.span;
                let name = self.expect_identifier()?;
                if self.check(&TokenKind::LeftParen) {
                    let call = self.parse_function_call(name, span)?;
                    return Ok(Expr::Method {
                        expr: Box::new(lhs),
                        call: Box::new(call),
                    });
                }
                match lhs {
                    // First dot on a bare name: qualified column; deeper
                    // access is resolved as a structure attribute.
                    Expr::Column {
                        table: None,
                        name: qualifier,
                        quoted: false,
                        ..
                    } => Ok(Expr::Column {
                        table: Some(qualifier),
                        name,
                        quoted: false,
                        span,
                    }),
                    other => Ok(Expr::Attribute {
                        expr: Box::new(other),
                        name,
                        span,
                    }),
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let index = self.parse_expression(0)?;
                self.expect(&TokenKind::RightBracket, "']'")?;
                Ok(Expr::Subscript {
                    expr: Box::new(lhs),
                    index: Box::new(index),
                })
            }
            TokenKind::DoubleColon => {
                self.advance();
                let span = self.current.span;
                let type_name = self.expect_identifier()?;
                Ok(Expr::Cast {
                    expr: Box::new(lhs),
                    type_name,
                    span,
                })
            }
            other => Err(ParseError::unexpected(
                "postfix operator",
                other.clone(),
                self.current.span,
            )),
        }
    }

    /// Parses one infix operator application.
    fn parse_infix(&mut self, lhs: Expr, right_bp: u8) -> Result<Expr> {
        match self.current.kind.clone() {
            TokenKind::Keyword(Keyword::Is) => {
                self.advance();
                let negated = self.eat_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                Ok(Expr::IsNull {
                    expr: Box::new(lhs),
                    negated,
                })
            }
            TokenKind::Keyword(Keyword::Not) => {
                self.advance();
                if self.eat_keyword(Keyword::In) {
                    self.parse_in_rhs(lhs, true)
                } else if self.eat_keyword(Keyword::Between) {
                    self.parse_between_rhs(lhs, true)
                } else if self.eat_keyword(Keyword::Like) {
                    let rhs = self.parse_expression(right_bp)?;
                    Ok(Expr::Unary {
                        op: crate::ast::UnaryOp::Not,
                        operand: Box::new(lhs.binary(BinaryOp::Like, rhs)),
                    })
                } else {
                    Err(ParseError::unexpected(
                        "IN, BETWEEN or LIKE after NOT",
                        self.current.kind.clone(),
                        self.current.span,
                    ))
                }
            }
            TokenKind::Keyword(Keyword::In) => {
                self.advance();
                self.parse_in_rhs(lhs, false)
            }
            TokenKind::Keyword(Keyword::Between) => {
                self.advance();
                self.parse_between_rhs(lhs, false)
            }
            kind => {
                let Some(op) = token_to_binary_op(&kind) else {
                    return Err(ParseError::unexpected(
                        "operator",
                        kind,
                        self.current.span,
                    ));
                };
                self.advance();
                let rhs = self.parse_expression(right_bp)?;
                Ok(lhs.binary(op, rhs))
            }
        }
    }

    fn parse_in_rhs(&mut self, lhs: Expr, negated: bool) -> Result<Expr> {
        let list = if self.eat(&TokenKind::LeftParen) {
            if matches!(
                self.current.kind,
                TokenKind::Keyword(Keyword::Select | Keyword::With)
            ) {
                let query = self.parse_query()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                InList::Subquery(Box::new(query))
            } else {
                let items = self.parse_expression_list()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                InList::Exprs(items)
            }
        } else {
            InList::Expr(Box::new(self.parse_expression(COMPARISON_BP)?))
        };
        Ok(Expr::In {
            expr: Box::new(lhs),
            list,
            negated,
        })
    }

    fn parse_between_rhs(&mut self, lhs: Expr, negated: bool) -> Result<Expr> {
        let low = self.parse_expression(COMPARISON_BP)?;
        self.expect_keyword(Keyword::And)?;
        let high = self.parse_expression(COMPARISON_BP)?;
        Ok(Expr::Between {
            expr: Box::new(lhs),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        })
    }

    fn parse_case(&mut self) -> Result<Expr> {
        self.expect_keyword(Keyword::Case)?;

        let operand = if self.check_keyword(Keyword::When) {
            None
        } else {
            Some(Box::new(self.parse_expression(0)?))
        };

        let mut when_clauses = Vec::new();
        while self.eat_keyword(Keyword::When) {
            let condition = self.parse_expression(0)?;
            self.expect_keyword(Keyword::Then)?;
            let result = self.parse_expression(0)?;
            when_clauses.push((condition, result));
        }
        if when_clauses.is_empty() {
            return Err(ParseError::new(
                "CASE requires at least one WHEN arm",
                self.current.span,
            ));
        }

        let else_clause = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expression(0)?))
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;

        Ok(Expr::Case {
            operand,
            when_clauses,
            else_clause,
        })
    }
}
