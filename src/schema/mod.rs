//! Schema aggregation and validation.
//!
//! Every `*.xsd` file under a contract directory is parsed and merged, in a
//! stable order, under one synthetic `xs:schema` root. The composite is then
//! compiled into a [`CompiledSchema`] that request elements are validated
//! against.

mod builtins;
mod compile;
mod model;
mod validate;

pub use builtins::BuiltinType;
pub use model::CompiledSchema;

use crate::error::ContractError;
use crate::parser::{NamespaceScope, ParseOptions, QName, XmlDocument, XmlElement, XmlNode};
use glob::Pattern;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// XML Schema namespace.
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// All `*.xsd` files under `dir`, recursively, sorted by path.
pub fn discover_schema_files(dir: &Path) -> Result<Vec<PathBuf>, ContractError> {
    let pattern = format!("{}/**/*.xsd", Pattern::escape(&dir.to_string_lossy()));
    let entries = glob::glob(&pattern).map_err(|e| ContractError::SchemaParse {
        path: dir.to_path_buf(),
        reason: format!("invalid search pattern: {}", e),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ContractError::SchemaParse {
            path: e.path().to_path_buf(),
            reason: e.error().to_string(),
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// One parsed schema document.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    pub path: PathBuf,
    pub root: XmlElement,
}

/// The ordered schema documents of one contract.
#[derive(Debug, Clone)]
pub struct SchemaSet {
    documents: Vec<SchemaDocument>,
}

impl SchemaSet {
    /// Load every schema document under `dir`.
    ///
    /// Fails on the first document that cannot be read or parsed; an empty
    /// set is an error.
    pub fn load(dir: &Path) -> Result<Self, ContractError> {
        let files = discover_schema_files(dir)?;
        if files.is_empty() {
            return Err(ContractError::NoSchemaFound(dir.to_path_buf()));
        }

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let text = std::fs::read_to_string(&path).map_err(|e| ContractError::SchemaParse {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let document = XmlDocument::parse(&text, &ParseOptions::trusted()).map_err(|e| {
                ContractError::SchemaParse {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !document.root.is(XS_NS, "schema") {
                return Err(ContractError::SchemaParse {
                    path,
                    reason: format!("root element <{}> is not xs:schema", document.root.display_name()),
                });
            }
            documents.push(SchemaDocument {
                path,
                root: document.root,
            });
        }

        debug!(dir = %dir.display(), documents = documents.len(), "Loaded schema set");
        Ok(Self { documents })
    }

    pub fn documents(&self) -> &[SchemaDocument] {
        &self.documents
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.documents.iter().map(|d| d.path.clone()).collect()
    }

    /// Synthetic `xs:schema` root holding every document root, in order.
    pub fn composite(&self) -> XmlElement {
        let mut root = XmlElement::new(QName::new(Some(XS_NS), "schema"), Arc::new(NamespaceScope::default()));
        root.children = self
            .documents
            .iter()
            .map(|d| XmlNode::Element(d.root.clone()))
            .collect();
        root
    }

    /// Compile the composite schema.
    pub fn compile(&self) -> Result<CompiledSchema, ContractError> {
        let composite = self.composite();
        let compiled = compile::compile(&composite, &self.paths())?;
        debug!(
            elements = compiled.global_elements.len(),
            types = compiled.global_types.len(),
            "Compiled schema set"
        );
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::XSI_NS;
    use std::fs;
    use tempfile::TempDir;

    fn schema(body: &str) -> String {
        format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                         xmlns:tns="urn:test" targetNamespace="urn:test"
                         elementFormDefault="qualified">{}</xs:schema>"#,
            body
        )
    }

    fn compile_str(body: &str) -> Result<CompiledSchema, ContractError> {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("types.xsd"), schema(body)).unwrap();
        SchemaSet::load(dir.path())?.compile()
    }

    fn instance(xml: &str) -> XmlElement {
        XmlDocument::parse(xml, &ParseOptions::hardened()).unwrap().root
    }

    fn check(compiled: &CompiledSchema, xml: &str) -> Result<(), Vec<crate::error::Diagnostic>> {
        compiled.validate_element(&instance(xml), 25)
    }

    const CUSTOMER: &str = r#"
        <xs:element name="GetCustomer">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="CustomerId" type="xs:int"/>
              <xs:element name="Email" type="xs:string" minOccurs="0"/>
            </xs:sequence>
          </xs:complexType>
        </xs:element>"#;

    #[test]
    fn test_discovery_is_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("b.xsd"), schema("")).unwrap();
        fs::write(dir.path().join("a.xsd"), schema("")).unwrap();
        fs::write(dir.path().join("nested/deeper/c.xsd"), schema("")).unwrap();
        fs::write(dir.path().join("service.wsdl"), "<x/>").unwrap();

        let files = discover_schema_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.xsd", "b.xsd", "nested/deeper/c.xsd"]);
    }

    #[test]
    fn test_empty_set_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("service.wsdl"), "<x/>").unwrap();
        assert!(matches!(SchemaSet::load(dir.path()), Err(ContractError::NoSchemaFound(_))));
    }

    #[test]
    fn test_parse_failure_names_the_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.xsd"), schema("")).unwrap();
        fs::write(dir.path().join("broken.xsd"), "<xs:schema").unwrap();
        match SchemaSet::load(dir.path()) {
            Err(ContractError::SchemaParse { path, .. }) => assert!(path.ends_with("broken.xsd")),
            other => panic!("expected a parse error, got {:?}", other.map(|s| s.paths())),
        }
    }

    #[test]
    fn test_non_schema_root_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("other.xsd"), "<notes/>").unwrap();
        assert!(matches!(SchemaSet::load(dir.path()), Err(ContractError::SchemaParse { .. })));
    }

    #[test]
    fn test_composite_keeps_discovery_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("2.xsd"), schema(r#"<xs:element name="Second"/>"#)).unwrap();
        fs::write(dir.path().join("1.xsd"), schema(r#"<xs:element name="First"/>"#)).unwrap();
        let set = SchemaSet::load(dir.path()).unwrap();
        let composite = set.composite();
        assert!(composite.is(XS_NS, "schema"));
        let firsts: Vec<_> = composite
            .elements()
            .map(|doc| doc.elements().next().unwrap().attribute("name").unwrap().to_string())
            .collect();
        assert_eq!(firsts, vec!["First", "Second"]);
    }

    #[test]
    fn test_cross_file_type_reference() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("elements.xsd"),
            schema(r#"<xs:element name="Order" type="tns:OrderType"/>"#),
        )
        .unwrap();
        fs::write(
            dir.path().join("types.xsd"),
            schema(r#"<xs:complexType name="OrderType"><xs:sequence><xs:element name="Id" type="xs:long"/></xs:sequence></xs:complexType>"#),
        )
        .unwrap();
        let compiled = SchemaSet::load(dir.path()).unwrap().compile().unwrap();
        assert!(check(&compiled, r#"<Order xmlns="urn:test"><Id>7</Id></Order>"#).is_ok());
        assert!(check(&compiled, r#"<Order xmlns="urn:test"><Id>x</Id></Order>"#).is_err());
    }

    #[test]
    fn test_unresolved_reference_fails_compile() {
        let err = compile_str(r#"<xs:element name="Order" type="tns:Missing"/>"#).unwrap_err();
        assert!(matches!(err, ContractError::SchemaCompile(_)));
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_duplicate_global_fails_compile() {
        let err = compile_str(r#"<xs:element name="A"/><xs:element name="A"/>"#).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_redefine_rejected() {
        let err = compile_str(r#"<xs:redefine schemaLocation="other.xsd"/>"#).unwrap_err();
        assert!(matches!(err, ContractError::SchemaCompile(_)));
    }

    #[test]
    fn test_type_mismatch_diagnostic() {
        let compiled = compile_str(CUSTOMER).unwrap();
        let diagnostics = check(
            &compiled,
            r#"<GetCustomer xmlns="urn:test"><CustomerId>abc</CustomerId></GetCustomer>"#,
        )
        .unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].path, "/GetCustomer/CustomerId");
        assert_eq!(diagnostics[0].message, "value 'abc' is not a valid xs:int");

        assert!(check(&compiled, r#"<GetCustomer xmlns="urn:test"><CustomerId> 42 </CustomerId></GetCustomer>"#).is_ok());
    }

    #[test]
    fn test_missing_and_unexpected_elements() {
        let compiled = compile_str(CUSTOMER).unwrap();
        let missing = check(&compiled, r#"<GetCustomer xmlns="urn:test"/>"#).unwrap_err();
        assert!(missing[0].message.contains("missing element"));
        assert!(missing[0].message.contains("<CustomerId>"));

        let unexpected = check(
            &compiled,
            r#"<GetCustomer xmlns="urn:test"><CustomerId>1</CustomerId><Phone/></GetCustomer>"#,
        )
        .unwrap_err();
        assert_eq!(unexpected[0].path, "/GetCustomer/Phone");
        assert!(unexpected[0].message.starts_with("unexpected element <Phone>"));
    }

    #[test]
    fn test_wrong_namespace_has_no_declaration() {
        let compiled = compile_str(CUSTOMER).unwrap();
        let diagnostics = check(&compiled, r#"<GetCustomer><CustomerId>1</CustomerId></GetCustomer>"#).unwrap_err();
        assert!(diagnostics[0].message.contains("no global element declaration"));
    }

    #[test]
    fn test_unqualified_locals() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("s.xsd"),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:test">
                 <xs:element name="Ping"><xs:complexType><xs:sequence>
                   <xs:element name="Seq" type="xs:unsignedShort"/>
                 </xs:sequence></xs:complexType></xs:element>
               </xs:schema>"#,
        )
        .unwrap();
        let compiled = SchemaSet::load(dir.path()).unwrap().compile().unwrap();
        assert!(check(&compiled, r#"<t:Ping xmlns:t="urn:test"><Seq>5</Seq></t:Ping>"#).is_ok());
        assert!(check(&compiled, r#"<t:Ping xmlns:t="urn:test"><t:Seq>5</t:Seq></t:Ping>"#).is_err());
        assert!(check(&compiled, r#"<t:Ping xmlns:t="urn:test"><Seq>70000</Seq></t:Ping>"#).is_err());
    }

    #[test]
    fn test_facets() {
        let compiled = compile_str(
            r#"
            <xs:simpleType name="Code">
              <xs:restriction base="xs:string">
                <xs:pattern value="[A-Z]{3}"/>
              </xs:restriction>
            </xs:simpleType>
            <xs:simpleType name="Status">
              <xs:restriction base="xs:token">
                <xs:enumeration value="OPEN"/>
                <xs:enumeration value="CLOSED"/>
              </xs:restriction>
            </xs:simpleType>
            <xs:simpleType name="Quantity">
              <xs:restriction base="xs:int">
                <xs:minInclusive value="1"/>
                <xs:maxExclusive value="100"/>
              </xs:restriction>
            </xs:simpleType>
            <xs:simpleType name="Price">
              <xs:restriction base="xs:decimal">
                <xs:totalDigits value="5"/>
                <xs:fractionDigits value="2"/>
              </xs:restriction>
            </xs:simpleType>
            <xs:element name="Item">
              <xs:complexType><xs:sequence>
                <xs:element name="Code" type="tns:Code"/>
                <xs:element name="Status" type="tns:Status"/>
                <xs:element name="Quantity" type="tns:Quantity"/>
                <xs:element name="Price" type="tns:Price"/>
                <xs:element name="Note" minOccurs="0">
                  <xs:simpleType><xs:restriction base="xs:string"><xs:maxLength value="4"/></xs:restriction></xs:simpleType>
                </xs:element>
              </xs:sequence></xs:complexType>
            </xs:element>"#,
        )
        .unwrap();

        let item = |code: &str, status: &str, qty: &str, price: &str, note: &str| {
            format!(
                r#"<Item xmlns="urn:test"><Code>{}</Code><Status>{}</Status><Quantity>{}</Quantity><Price>{}</Price>{}</Item>"#,
                code, status, qty, price, note
            )
        };

        assert!(check(&compiled, &item("ABC", " OPEN ", "99", "123.45", "<Note>abcd</Note>")).is_ok());
        assert!(check(&compiled, &item("abc", "OPEN", "1", "1", "")).is_err());
        assert!(check(&compiled, &item("ABC", "PENDING", "1", "1", "")).is_err());
        assert!(check(&compiled, &item("ABC", "OPEN", "100", "1", "")).is_err());
        assert!(check(&compiled, &item("ABC", "OPEN", "0", "1", "")).is_err());
        assert!(check(&compiled, &item("ABC", "OPEN", "1", "1.234", "")).is_err());
        assert!(check(&compiled, &item("ABC", "OPEN", "1", "1234.56", "")).is_err());
        assert!(check(&compiled, &item("ABC", "OPEN", "1", "1", "<Note>abcde</Note>")).is_err());
    }

    #[test]
    fn test_attributes() {
        let compiled = compile_str(
            r#"
            <xs:element name="Query">
              <xs:complexType>
                <xs:simpleContent>
                  <xs:extension base="xs:string">
                    <xs:attribute name="limit" type="xs:positiveInteger" use="required"/>
                    <xs:attribute name="lang" type="xs:language"/>
                  </xs:extension>
                </xs:simpleContent>
              </xs:complexType>
            </xs:element>"#,
        )
        .unwrap();

        assert!(check(&compiled, r#"<Query xmlns="urn:test" limit="10">text</Query>"#).is_ok());
        let missing = check(&compiled, r#"<Query xmlns="urn:test">text</Query>"#).unwrap_err();
        assert!(missing[0].message.contains("missing required attribute 'limit'"));
        let bad = check(&compiled, r#"<Query xmlns="urn:test" limit="0">t</Query>"#).unwrap_err();
        assert_eq!(bad[0].path, "/Query/@limit");
        let extra = check(&compiled, r#"<Query xmlns="urn:test" limit="1" color="red">t</Query>"#).unwrap_err();
        assert!(extra[0].message.contains("attribute 'color' is not allowed"));
    }

    #[test]
    fn test_choice_and_repetition() {
        let compiled = compile_str(
            r#"
            <xs:element name="Batch">
              <xs:complexType>
                <xs:sequence>
                  <xs:choice maxOccurs="unbounded">
                    <xs:element name="Add" type="xs:int"/>
                    <xs:element name="Remove" type="xs:int"/>
                  </xs:choice>
                  <xs:element name="Remove" type="xs:string" minOccurs="0"/>
                  <xs:element name="Commit" type="xs:boolean"/>
                </xs:sequence>
              </xs:complexType>
            </xs:element>"#,
        )
        .unwrap();

        assert!(check(
            &compiled,
            r#"<Batch xmlns="urn:test"><Add>1</Add><Remove>2</Remove><Add>3</Add><Commit>true</Commit></Batch>"#
        )
        .is_ok());
        assert!(check(&compiled, r#"<Batch xmlns="urn:test"><Commit>true</Commit></Batch>"#).is_err());
    }

    #[test]
    fn test_all_group() {
        let compiled = compile_str(
            r#"
            <xs:element name="Address">
              <xs:complexType>
                <xs:all>
                  <xs:element name="City" type="xs:string"/>
                  <xs:element name="Zip" type="xs:string" minOccurs="0"/>
                </xs:all>
              </xs:complexType>
            </xs:element>"#,
        )
        .unwrap();

        assert!(check(&compiled, r#"<Address xmlns="urn:test"><Zip>1</Zip><City>X</City></Address>"#).is_ok());
        assert!(check(&compiled, r#"<Address xmlns="urn:test"><City>X</City></Address>"#).is_ok());
        assert!(check(&compiled, r#"<Address xmlns="urn:test"><Zip>1</Zip></Address>"#).is_err());
        assert!(check(&compiled, r#"<Address xmlns="urn:test"><City>X</City><City>Y</City></Address>"#).is_err());
    }

    #[test]
    fn test_extension_and_xsi_type() {
        let compiled = compile_str(
            r#"
            <xs:complexType name="Party">
              <xs:sequence><xs:element name="Name" type="xs:string"/></xs:sequence>
            </xs:complexType>
            <xs:complexType name="Company">
              <xs:complexContent>
                <xs:extension base="tns:Party">
                  <xs:sequence><xs:element name="VatId" type="xs:string"/></xs:sequence>
                </xs:extension>
              </xs:complexContent>
            </xs:complexType>
            <xs:element name="Party" type="tns:Party"/>"#,
        )
        .unwrap();

        assert!(check(&compiled, r#"<Party xmlns="urn:test"><Name>A</Name></Party>"#).is_ok());
        let with_type = format!(
            r#"<Party xmlns="urn:test" xmlns:xsi="{}" xmlns:t="urn:test" xsi:type="t:Company"><Name>A</Name><VatId>1</VatId></Party>"#,
            XSI_NS
        );
        assert!(check(&compiled, &with_type).is_ok());
        assert!(check(&compiled, r#"<Party xmlns="urn:test"><Name>A</Name><VatId>1</VatId></Party>"#).is_err());
    }

    #[test]
    fn test_nillable() {
        let compiled = compile_str(
            r#"
            <xs:element name="Lookup">
              <xs:complexType><xs:sequence>
                <xs:element name="Hint" type="xs:int" nillable="true"/>
                <xs:element name="Key" type="xs:int"/>
              </xs:sequence></xs:complexType>
            </xs:element>"#,
        )
        .unwrap();
        let xml = |hint: &str, key: &str| {
            format!(
                r#"<Lookup xmlns="urn:test" xmlns:xsi="{}"><Hint {}/><Key {}/></Lookup>"#,
                XSI_NS, hint, key
            )
        };
        assert!(check(&compiled, &xml(r#"xsi:nil="true""#, r#"xsi:nil="false""#)).is_err());
        let diagnostics = check(&compiled, &xml(r#"xsi:nil="true""#, r#"xsi:nil="true""#)).unwrap_err();
        assert!(diagnostics[0].message.contains("not nillable"));
    }

    #[test]
    fn test_substitution_group_and_wildcard() {
        let compiled = compile_str(
            r###"
            <xs:element name="Payment" abstract="true" type="xs:string"/>
            <xs:element name="Card" substitutionGroup="tns:Payment"/>
            <xs:element name="Order">
              <xs:complexType><xs:sequence>
                <xs:element ref="tns:Payment"/>
                <xs:any namespace="##other" processContents="lax" minOccurs="0"/>
              </xs:sequence></xs:complexType>
            </xs:element>"###,
        )
        .unwrap();

        assert!(check(&compiled, r#"<Order xmlns="urn:test"><Card>4111</Card></Order>"#).is_ok());
        assert!(check(&compiled, r#"<Order xmlns="urn:test"><Payment>x</Payment></Order>"#).is_err());
        assert!(check(
            &compiled,
            r#"<Order xmlns="urn:test"><Card>4111</Card><ext:Trace xmlns:ext="urn:ext">1</ext:Trace></Order>"#
        )
        .is_ok());
    }

    #[test]
    fn test_diagnostics_are_capped() {
        let compiled = compile_str(
            r#"<xs:element name="Ids"><xs:complexType><xs:sequence>
                 <xs:element name="Id" type="xs:int" maxOccurs="unbounded"/>
               </xs:sequence></xs:complexType></xs:element>"#,
        )
        .unwrap();
        let ids = "<Id>x</Id>".repeat(10);
        let xml = format!(r#"<Ids xmlns="urn:test">{}</Ids>"#, ids);
        assert_eq!(compiled.validate_element(&instance(&xml), 3).unwrap_err().len(), 3);
    }

    #[test]
    fn test_long_sibling_lists() {
        let compiled = compile_str(
            r#"<xs:element name="Ids"><xs:complexType><xs:sequence>
                 <xs:element name="Id" type="xs:int" maxOccurs="unbounded"/>
                 <xs:element name="End" type="xs:string"/>
               </xs:sequence></xs:complexType></xs:element>"#,
        )
        .unwrap();
        let xml = format!(r#"<Ids xmlns="urn:test">{}<End/></Ids>"#, "<Id>1</Id>".repeat(20_000));
        assert!(check(&compiled, &xml).is_ok());
    }

    #[test]
    fn test_substitution_member_declared_before_head() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a_members.xsd"),
            schema(r#"<xs:element name="Cat" type="xs:string" substitutionGroup="tns:Animal"/>"#),
        )
        .unwrap();
        fs::write(
            dir.path().join("b_heads.xsd"),
            schema(
                r#"<xs:element name="Animal" type="xs:string"/>
                   <xs:element name="Op"><xs:complexType><xs:sequence>
                     <xs:element ref="tns:Animal"/>
                   </xs:sequence></xs:complexType></xs:element>"#,
            ),
        )
        .unwrap();
        let compiled = SchemaSet::load(dir.path()).unwrap().compile().unwrap();

        assert!(check(&compiled, r#"<Op xmlns="urn:test"><Cat>tom</Cat></Op>"#).is_ok());
        assert!(check(&compiled, r#"<Op xmlns="urn:test"><Animal>rex</Animal></Op>"#).is_ok());
        assert!(check(&compiled, r#"<Op xmlns="urn:test"><Dog>rex</Dog></Op>"#).is_err());
    }

    #[test]
    fn test_long_repeated_choice() {
        let compiled = compile_str(
            r#"<xs:element name="Op"><xs:complexType>
                 <xs:choice maxOccurs="unbounded">
                   <xs:element name="A" type="xs:int"/>
                   <xs:element name="B" type="xs:int"/>
                 </xs:choice>
               </xs:complexType></xs:element>"#,
        )
        .unwrap();
        let xml = format!(r#"<Op xmlns="urn:test">{}</Op>"#, "<A>1</A><B>2</B>".repeat(2_500));
        assert!(check(&compiled, &xml).is_ok());

        let xml = format!(r#"<Op xmlns="urn:test">{}<B>x</B></Op>"#, "<A>1</A><B>2</B>".repeat(2_500));
        let diagnostics = check(&compiled, &xml).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].path, "/Op/B");
        assert!(diagnostics[0].message.contains("xs:int"));
    }

    #[test]
    fn test_long_repeated_sequence() {
        let compiled = compile_str(
            r#"<xs:element name="Ledger"><xs:complexType><xs:sequence>
                 <xs:sequence maxOccurs="unbounded">
                   <xs:element name="Debit" type="xs:decimal"/>
                   <xs:element name="Note" type="xs:string" minOccurs="0"/>
                 </xs:sequence>
                 <xs:element name="Total" type="xs:decimal"/>
               </xs:sequence></xs:complexType></xs:element>"#,
        )
        .unwrap();
        let entries = "<Debit>1.5</Debit><Note>n</Note><Debit>2</Debit>".repeat(1_500);
        let xml = format!(r#"<Ledger xmlns="urn:test">{}<Total>5250</Total></Ledger>"#, entries);
        assert!(check(&compiled, &xml).is_ok());

        let xml = format!(r#"<Ledger xmlns="urn:test">{}</Ledger>"#, entries);
        let diagnostics = check(&compiled, &xml).unwrap_err();
        assert!(diagnostics[0].message.contains("Total"), "{:?}", diagnostics);
    }

    #[test]
    fn test_bounded_group_repetition() {
        let compiled = compile_str(
            r#"<xs:element name="Pair"><xs:complexType>
                 <xs:sequence minOccurs="2" maxOccurs="3">
                   <xs:element name="Key" type="xs:string"/>
                   <xs:element name="Value" type="xs:string"/>
                 </xs:sequence>
               </xs:complexType></xs:element>"#,
        )
        .unwrap();
        let pairs = |n: usize| format!(r#"<Pair xmlns="urn:test">{}</Pair>"#, "<Key>k</Key><Value>v</Value>".repeat(n));
        assert!(check(&compiled, &pairs(1)).is_err());
        assert!(check(&compiled, &pairs(2)).is_ok());
        assert!(check(&compiled, &pairs(3)).is_ok());
        assert!(check(&compiled, &pairs(4)).is_err());
    }
}
