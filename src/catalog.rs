use std::collections::HashMap;

use crate::type_decode::{decode_type, Kind, Type};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassFlags: u32 {
        const META = 1 << 0;
        const ROOT = 1 << 1;
        const HAS_CXX_STRUCTORS = 1 << 2;
        const HIDDEN = 1 << 4;
        const EXCEPTION = 1 << 5;
        const HAS_SWIFT_INITIALIZER = 1 << 6;
        const IS_ARC = 1 << 7;
        const HAS_CXX_DTOR_ONLY = 1 << 8;
        const HAS_WEAK_WITHOUT_ARC = 1 << 9;
        const FORBIDS_ASSOCIATED_OBJECTS = 1 << 10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolRef(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub mangled_type: String,
    pub address: u64,
    pub is_instance: bool,
}

impl Method {
    pub fn prototype(&self) -> Option<(Type, Vec<Type>)> {
        let mut types = decode_type(&self.mangled_type);
        if types.is_empty() {
            return None;
        }
        let return_type = types.remove(0);
        Some((return_type, types))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IVar {
    pub name: String,
    pub mangled_type: String,
}

impl IVar {
    pub fn ty(&self) -> Option<Type> {
        let mut types = decode_type(&self.mangled_type);
        if types.len() != 1 {
            return None;
        }
        types.pop()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub attribute: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub name: String,
    pub flags: ClassFlags,
    pub instance_start: u32,
    pub instance_size: u32,
    pub superclass: Option<Box<Class>>,
    pub methods: Vec<Method>,
    pub ivars: Vec<IVar>,
    pub properties: Vec<Property>,
    pub protocols: Vec<ProtocolRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    pub mangled_name: String,
    pub required_methods: Vec<Method>,
    pub optional_methods: Vec<Method>,
    pub properties: Vec<Property>,
    pub protocols: Vec<ProtocolRef>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    classes: Vec<Class>,
    protocols: Vec<Protocol>,
    class_by_name: HashMap<String, usize>,
    protocol_by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn push_class(&mut self, class: Class) {
        let index = self.classes.len();
        self.class_by_name.insert(class.name.clone(), index);
        self.classes.push(class);
    }

    pub fn push_protocol(&mut self, protocol: Protocol) -> ProtocolRef {
        let index = self.protocols.len();
        self.protocol_by_name.insert(protocol.mangled_name.clone(), index);
        self.protocols.push(protocol);
        ProtocolRef(index)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    pub fn protocols(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.iter()
    }

    pub fn get_class(&self, name: &str) -> Option<&Class> {
        self.class_by_name.get(name).map(|&i| &self.classes[i])
    }

    pub fn get_protocol(&self, name: &str) -> Option<&Protocol> {
        self.protocol_by_name.get(name).map(|&i| &self.protocols[i])
    }

    pub fn protocol_at(&self, r: ProtocolRef) -> Option<&Protocol> {
        self.protocols.get(r.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, is_instance: bool) -> Method {
        Method {
            name: name.to_string(),
            mangled_type: "v16@0:8".to_string(),
            address: 0,
            is_instance,
        }
    }

    #[test]
    fn protocol_ref_resolves_through_the_catalog() {
        let mut catalog = Catalog::new();
        let pref = catalog.push_protocol(Protocol {
            mangled_name: "NSCopying".to_string(),
            required_methods: vec![method("copyWithZone:", true)],
            optional_methods: vec![],
            properties: vec![],
            protocols: vec![],
        });

        let class = Class {
            name: "Foo".to_string(),
            flags: ClassFlags::empty(),
            instance_start: 8,
            instance_size: 16,
            superclass: None,
            methods: vec![],
            ivars: vec![],
            properties: vec![],
            protocols: vec![pref],
        };
        catalog.push_class(class);

        let foo = catalog.get_class("Foo").unwrap();
        let resolved = catalog.protocol_at(foo.protocols[0]).unwrap();
        assert_eq!(resolved.mangled_name, "NSCopying");
        assert_eq!(catalog.get_protocol("NSCopying"), Some(resolved));
    }

    #[test]
    fn classes_and_protocols_preserve_insertion_order() {
        let mut catalog = Catalog::new();
        catalog.push_protocol(Protocol {
            mangled_name: "A".to_string(),
            required_methods: vec![],
            optional_methods: vec![],
            properties: vec![],
            protocols: vec![],
        });
        catalog.push_protocol(Protocol {
            mangled_name: "B".to_string(),
            required_methods: vec![],
            optional_methods: vec![],
            properties: vec![],
            protocols: vec![],
        });
        let names: Vec<&str> = catalog.protocols().map(|p| p.mangled_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn method_prototype_splits_return_and_params() {
        let m = method("bar:", true);
        let (ret, params) = m.prototype().unwrap();
        assert_eq!(ret.kind, Kind::Primitive(crate::type_decode::PrimitiveKind::Void));
        assert_eq!(params.len(), 2);
    }
}
