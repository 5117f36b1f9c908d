use crate::binary_image::{BinaryImage, Section};
use crate::catalog::{Catalog, Class, ClassFlags, IVar, Method, Property, Protocol, ProtocolRef};
use crate::cursor::StreamCursor;

const FAST_DATA_MASK: u64 = 0x00007ffffffffff8;
const PTR_TAG_MASK: u64 = (1u64 << 51) - 1;

const METHOD_LIST_IS_SMALL: u32 = 0x80000000;
const METHOD_LIST_FLAG_MASK: u32 = 0xffff0003;

fn decode_ptr(raw: u64, image_base: u64) -> u64 {
    let decoded = raw & PTR_TAG_MASK;
    if image_base > 0 && decoded < image_base {
        decoded + image_base
    } else {
        decoded
    }
}

fn read_u64_at(image: &BinaryImage, vaddr: u64) -> Option<u64> {
    StreamCursor::new(image, vaddr).read::<u64>().ok()
}

fn read_u32_at(image: &BinaryImage, vaddr: u64) -> Option<u32> {
    StreamCursor::new(image, vaddr).read::<u32>().ok()
}

fn read_i32_at(image: &BinaryImage, vaddr: u64) -> Option<i32> {
    StreamCursor::new(image, vaddr).read::<i32>().ok()
}

fn read_cstring_at(image: &BinaryImage, vaddr: u64) -> Option<String> {
    image.read_cstring_at(vaddr).ok()
}

fn get_objc_section(image: &BinaryImage, name: &str) -> Option<Section> {
    for segment in ["__DATA", "__DATA_CONST", "__DATA_DIRTY"] {
        if let Some(section) = image.sections(segment, name) {
            return Some(section);
        }
    }
    log::debug!("section {} not present under __DATA*", name);
    None
}

fn pointer_list(section: &Section) -> Vec<u64> {
    section
        .content()
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

struct MethodListHeader {
    is_small: bool,
    stride: u32,
    count: u32,
    entries_addr: u64,
}

fn read_method_list_header(image: &BinaryImage, list_vaddr: u64) -> Option<MethodListHeader> {
    let entsize_and_flags = read_u32_at(image, list_vaddr)?;
    let count = read_u32_at(image, list_vaddr + 4)?;
    let is_small = entsize_and_flags & METHOD_LIST_IS_SMALL != 0;
    let stride = entsize_and_flags & !METHOD_LIST_FLAG_MASK;
    Some(MethodListHeader { is_small, stride, count, entries_addr: list_vaddr + 8 })
}

fn read_small_method(image: &BinaryImage, image_base: u64, entry_base: u64) -> Option<Method> {
    let name_field = entry_base;
    let types_field = entry_base + 4;
    let imp_field = entry_base + 8;

    let name_rel = read_i32_at(image, name_field)?;
    let types_rel = read_i32_at(image, types_field)?;
    let imp_rel = read_i32_at(image, imp_field)?;

    let name_ptr_loc = (name_field as i64 + name_rel as i64) as u64;
    let sel_ptr = read_u64_at(image, name_ptr_loc)?;
    let name = read_cstring_at(image, decode_ptr(sel_ptr, image_base))?;

    let types_loc = (types_field as i64 + types_rel as i64) as u64;
    let mangled_type = read_cstring_at(image, types_loc)?;

    let address = (imp_field as i64 + imp_rel as i64) as u64;

    Some(Method { name, mangled_type, address, is_instance: true })
}

fn read_big_method(image: &BinaryImage, image_base: u64, entry_base: u64) -> Option<Method> {
    let name_ptr = read_u64_at(image, entry_base)?;
    let types_ptr = read_u64_at(image, entry_base + 8)?;
    let address = read_u64_at(image, entry_base + 16)?;

    let name = read_cstring_at(image, decode_ptr(name_ptr, image_base))?;
    let mangled_type = read_cstring_at(image, decode_ptr(types_ptr, image_base))?;

    Some(Method { name, mangled_type, address, is_instance: true })
}

fn read_method_list(image: &BinaryImage, image_base: u64, list_vaddr: u64) -> Vec<Method> {
    if list_vaddr == 0 {
        return Vec::new();
    }
    let header = match read_method_list_header(image, list_vaddr) {
        Some(h) => h,
        None => {
            log::warn!("method_list_t@0x{:x} unreadable", list_vaddr);
            return Vec::new();
        }
    };

    let mut methods = Vec::with_capacity(header.count as usize);
    for i in 0..header.count as u64 {
        let entry_base = header.entries_addr + i * header.stride as u64;
        let method = if header.is_small {
            read_small_method(image, image_base, entry_base)
        } else {
            read_big_method(image, image_base, entry_base)
        };
        match method {
            Some(m) => methods.push(m),
            None => {
                log::warn!("method_list_t@0x{:x} entry {} truncated, stopping", list_vaddr, i);
                break;
            }
        }
    }
    methods
}

fn read_ivar_list(image: &BinaryImage, image_base: u64, list_vaddr: u64) -> Vec<IVar> {
    if list_vaddr == 0 {
        return Vec::new();
    }
    let count = match read_u32_at(image, list_vaddr + 4) {
        Some(c) => c,
        None => return Vec::new(),
    };
    const IVAR_T_SIZE: u64 = 8 + 8 + 8 + 4 + 4;
    let entries_addr = list_vaddr + 8;

    let mut ivars = Vec::with_capacity(count as usize);
    for i in 0..count as u64 {
        let entry = entries_addr + i * IVAR_T_SIZE;
        let name_ptr = read_u64_at(image, entry + 8);
        let type_ptr = read_u64_at(image, entry + 16);
        let (name_ptr, type_ptr) = match (name_ptr, type_ptr) {
            (Some(n), Some(t)) => (n, t),
            _ => {
                log::warn!("ivar_t@0x{:x} entry {} truncated, stopping", list_vaddr, i);
                break;
            }
        };
        let name = read_cstring_at(image, decode_ptr(name_ptr, image_base));
        let mangled_type = read_cstring_at(image, decode_ptr(type_ptr, image_base));
        match (name, mangled_type) {
            (Some(name), Some(mangled_type)) => ivars.push(IVar { name, mangled_type }),
            _ => {
                log::warn!("ivar_t@0x{:x} entry {} has unreadable name/type", list_vaddr, i);
                break;
            }
        }
    }
    ivars
}

fn read_property_list(image: &BinaryImage, image_base: u64, list_vaddr: u64) -> Vec<Property> {
    if list_vaddr == 0 {
        return Vec::new();
    }
    let count = match read_u32_at(image, list_vaddr + 4) {
        Some(c) => c,
        None => return Vec::new(),
    };
    const PROPERTY_T_SIZE: u64 = 16;
    let entries_addr = list_vaddr + 8;

    let mut properties = Vec::with_capacity(count as usize);
    for i in 0..count as u64 {
        let entry = entries_addr + i * PROPERTY_T_SIZE;
        let name_ptr = read_u64_at(image, entry);
        let attr_ptr = read_u64_at(image, entry + 8);
        let (name_ptr, attr_ptr) = match (name_ptr, attr_ptr) {
            (Some(n), Some(a)) => (n, a),
            _ => break,
        };
        let name = read_cstring_at(image, decode_ptr(name_ptr, image_base));
        let attribute = read_cstring_at(image, decode_ptr(attr_ptr, image_base));
        match (name, attribute) {
            (Some(name), Some(attribute)) => properties.push(Property { name, attribute }),
            _ => break,
        }
    }
    properties
}

struct ClassRo {
    flags: u32,
    instance_start: u32,
    instance_size: u32,
    name: String,
    base_method_list: u64,
    base_protocols: u64,
    ivars: u64,
    base_properties: u64,
}

fn read_class_ro(image: &BinaryImage, image_base: u64, vaddr: u64) -> Option<ClassRo> {
    let flags = read_u32_at(image, vaddr)?;
    let instance_start = read_u32_at(image, vaddr + 4)?;
    let instance_size = read_u32_at(image, vaddr + 8)?;
    // vaddr + 12: reserved (x64 only, unused)
    // vaddr + 16: ivar_layout / non_metaclass pointer (unused)
    let name_ptr = read_u64_at(image, vaddr + 24)?;
    let base_method_list = read_u64_at(image, vaddr + 32)?;
    let base_protocols = read_u64_at(image, vaddr + 40)?;
    let ivars = read_u64_at(image, vaddr + 48)?;
    // vaddr + 56: weak_ivar_layout pointer (unused)
    let base_properties = read_u64_at(image, vaddr + 64)?;

    let name = read_cstring_at(image, decode_ptr(name_ptr, image_base))?;

    Some(ClassRo {
        flags,
        instance_start,
        instance_size,
        name,
        base_method_list: decode_ptr(base_method_list, image_base),
        base_protocols: decode_ptr(base_protocols, image_base),
        ivars: decode_ptr(ivars, image_base),
        base_properties: decode_ptr(base_properties, image_base),
    })
}

fn resolve_class_ro(image: &BinaryImage, image_base: u64, bits: u64) -> Option<ClassRo> {
    let masked = bits & FAST_DATA_MASK;
    let direct_addr = decode_ptr(masked, image_base);
    if let Some(ro) = read_class_ro(image, image_base, direct_addr) {
        return Some(ro);
    }
    log::debug!("class_ro_t@0x{:x} unreadable, trying class_rw_ext_t fallback", direct_addr);
    let rw_ext_ro_ptr = read_u64_at(image, direct_addr)?;
    let ro_addr = decode_ptr(rw_ext_ro_ptr, image_base);
    read_class_ro(image, image_base, ro_addr)
}

pub struct MetadataParser<'a> {
    image: &'a BinaryImage,
    image_base: u64,
    protocol_offsets: std::collections::HashMap<u64, ProtocolRef>,
    protocols_in_progress: std::collections::HashSet<u64>,
    catalog: Catalog,
}

impl<'a> MetadataParser<'a> {
    pub fn new(image: &'a BinaryImage) -> Self {
        MetadataParser {
            image,
            image_base: image.imagebase(),
            protocol_offsets: std::collections::HashMap::new(),
            protocols_in_progress: std::collections::HashSet::new(),
            catalog: Catalog::new(),
        }
    }

    pub fn run(mut self) -> Catalog {
        self.parse_protocols();
        self.parse_classes();
        self.catalog
    }

    fn parse_protocols(&mut self) {
        let Some(section) = get_objc_section(self.image, "__objc_protolist") else {
            return;
        };
        for raw in pointer_list(&section) {
            let offset = decode_ptr(raw, self.image_base);
            self.get_or_create_protocol(offset);
        }
    }

    fn parse_classes(&mut self) {
        let Some(section) = get_objc_section(self.image, "__objc_classlist") else {
            return;
        };
        for raw in pointer_list(&section) {
            let offset = decode_ptr(raw, self.image_base);
            match self.build_class(offset) {
                Some(class) => self.catalog.push_class(class),
                None => log::warn!("__objc_classlist entry 0x{:x} unreadable, skipping", offset),
            }
        }
    }

    fn get_or_create_protocol(&mut self, offset: u64) -> Option<ProtocolRef> {
        if let Some(&r) = self.protocol_offsets.get(&offset) {
            return Some(r);
        }
        if offset == 0 || self.protocols_in_progress.contains(&offset) {
            return None;
        }

        self.protocols_in_progress.insert(offset);
        let built = self.build_protocol(offset);
        self.protocols_in_progress.remove(&offset);

        let protocol = match built {
            Some(p) => p,
            None => {
                log::warn!("protocol_t@0x{:x} unreadable, skipping", offset);
                return None;
            }
        };
        let r = self.catalog.push_protocol(protocol);
        self.protocol_offsets.insert(offset, r);
        Some(r)
    }

    fn build_protocol(&mut self, offset: u64) -> Option<Protocol> {
        // protocol_t: isa(8) mangled_name(8) protocols(8) instance_methods(8)
        // class_methods(8) optional_instance_methods(8) optional_class_methods(8)
        // instance_properties(8) size(4) flags(4) extended_method_types(8)
        let mangled_name_ptr = read_u64_at(self.image, offset + 8)?;
        let protocols_ptr = read_u64_at(self.image, offset + 16)?;
        let instance_methods_ptr = read_u64_at(self.image, offset + 24)?;
        let class_methods_ptr = read_u64_at(self.image, offset + 32)?;
        let optional_instance_methods_ptr = read_u64_at(self.image, offset + 40)?;
        let optional_class_methods_ptr = read_u64_at(self.image, offset + 48)?;
        let instance_properties_ptr = read_u64_at(self.image, offset + 56)?;

        let mangled_name = read_cstring_at(self.image, decode_ptr(mangled_name_ptr, self.image_base))?;

        let protocols_vaddr = decode_ptr(protocols_ptr, self.image_base);
        let protocols = self.read_protocol_refs(protocols_vaddr);

        let mut required_methods =
            read_method_list(self.image, self.image_base, decode_ptr(instance_methods_ptr, self.image_base));
        for m in &mut required_methods {
            m.is_instance = true;
        }
        let mut class_required =
            read_method_list(self.image, self.image_base, decode_ptr(class_methods_ptr, self.image_base));
        for m in &mut class_required {
            m.is_instance = false;
        }
        required_methods.extend(class_required);

        let mut optional_methods = read_method_list(
            self.image,
            self.image_base,
            decode_ptr(optional_instance_methods_ptr, self.image_base),
        );
        for m in &mut optional_methods {
            m.is_instance = true;
        }
        let mut class_optional = read_method_list(
            self.image,
            self.image_base,
            decode_ptr(optional_class_methods_ptr, self.image_base),
        );
        for m in &mut class_optional {
            m.is_instance = false;
        }
        optional_methods.extend(class_optional);

        let properties = read_property_list(
            self.image,
            self.image_base,
            decode_ptr(instance_properties_ptr, self.image_base),
        );

        Some(Protocol { mangled_name, required_methods, optional_methods, properties, protocols })
    }

    fn read_protocol_refs(&mut self, list_vaddr: u64) -> Vec<ProtocolRef> {
        if list_vaddr == 0 {
            return Vec::new();
        }
        let count = match read_u64_at(self.image, list_vaddr) {
            Some(c) => c,
            None => return Vec::new(),
        };
        let mut refs = Vec::with_capacity(count as usize);
        for i in 0..count {
            let entry = list_vaddr + 8 + i * 8;
            let raw = match read_u64_at(self.image, entry) {
                Some(r) => r,
                None => break,
            };
            let offset = decode_ptr(raw, self.image_base);
            if let Some(r) = self.get_or_create_protocol(offset) {
                refs.push(r);
            }
        }
        refs
    }

    fn build_class(&mut self, offset: u64) -> Option<Class> {
        if offset == 0 {
            return None;
        }
        // objc_class_t: super_class(8) cache_t(24, unused) bits(8) = 0x28
        let super_class_raw = read_u64_at(self.image, offset)?;
        let bits = read_u64_at(self.image, offset + 32)?;

        let ro = resolve_class_ro(self.image, self.image_base, bits)?;

        let mut methods = read_method_list(self.image, self.image_base, ro.base_method_list);
        let is_meta = ro.flags & ClassFlags::META.bits() != 0;
        for m in &mut methods {
            m.is_instance = !is_meta;
        }

        let superclass = if super_class_raw != 0 {
            let super_offset = decode_ptr(super_class_raw, self.image_base);
            if super_offset != offset {
                self.build_class(super_offset)
            } else {
                None
            }
        } else {
            None
        };

        if let Some(sup) = &superclass {
            for m in &sup.methods {
                let mut inherited = m.clone();
                inherited.is_instance = false;
                methods.push(inherited);
            }
        }

        let protocols = self.read_protocol_refs(ro.base_protocols);
        let ivars = read_ivar_list(self.image, self.image_base, ro.ivars);
        let properties = read_property_list(self.image, self.image_base, ro.base_properties);

        Some(Class {
            name: ro.name,
            flags: ClassFlags::from_bits_truncate(ro.flags),
            instance_start: ro.instance_start,
            instance_size: ro.instance_size,
            superclass: superclass.map(Box::new),
            methods,
            ivars,
            properties,
            protocols,
        })
    }
}

pub fn parse(image: &BinaryImage) -> Catalog {
    MetadataParser::new(image).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_image::{segment_with_section_image, single_segment_image};

    fn cstr(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    fn fixture_image() -> BinaryImage {
        let base: u64 = 0x1000;
        let mut buf = vec![0u8; 0x300];

        let write_u64 = |buf: &mut Vec<u8>, off: u64, v: u64| {
            buf[off as usize..off as usize + 8].copy_from_slice(&v.to_le_bytes());
        };
        let write_u32 = |buf: &mut Vec<u8>, off: u64, v: u32| {
            buf[off as usize..off as usize + 4].copy_from_slice(&v.to_le_bytes());
        };
        let write_bytes = |buf: &mut Vec<u8>, off: u64, bytes: &[u8]| {
            buf[off as usize..off as usize + bytes.len()].copy_from_slice(bytes);
        };

        // __objc_classlist (at file-relative 0x0, vaddr 0x1000): one pointer.
        write_u64(&mut buf, 0x0, 0x1100);

        // objc_class_t @ 0x1100 (file-relative 0x100)
        write_u64(&mut buf, 0x100, 0); // super_class
        write_u64(&mut buf, 0x100 + 32, 0x1140); // bits -> class_ro_t directly (tag 0)

        // class_ro_t @ 0x1140 (file-relative 0x140)
        write_u32(&mut buf, 0x140, ClassFlags::ROOT.bits());
        write_u32(&mut buf, 0x144, 8); // instance_start
        write_u32(&mut buf, 0x148, 16); // instance_size
        write_u64(&mut buf, 0x140 + 24, 0x1200); // name
        write_u64(&mut buf, 0x140 + 32, 0x1220); // base_method_list
        write_u64(&mut buf, 0x140 + 40, 0); // base_protocols
        write_u64(&mut buf, 0x140 + 48, 0); // ivars
        write_u64(&mut buf, 0x140 + 64, 0); // base_properties

        write_bytes(&mut buf, 0x200, &cstr("Foo"));

        // method_list_t @ 0x1220 (file-relative 0x220): big (absolute) form.
        write_u32(&mut buf, 0x220, 24); // entsize_and_flags, not small
        write_u32(&mut buf, 0x224, 1); // count
        write_u64(&mut buf, 0x228, 0x1260); // name
        write_u64(&mut buf, 0x228 + 8, 0x1270); // types
        write_u64(&mut buf, 0x228 + 16, 0xdead); // imp

        write_bytes(&mut buf, 0x260, &cstr("bar:"));
        write_bytes(&mut buf, 0x270, &cstr("v16@0:8"));

        segment_with_section_image("__DATA", base, buf, &[("__objc_classlist", base, 8)])
    }

    #[test]
    fn parses_one_class_with_one_instance_method() {
        let image = fixture_image();
        let catalog = parse(&image);

        let classes: Vec<&Class> = catalog.classes().collect();
        assert_eq!(classes.len(), 1);
        let foo = classes[0];
        assert_eq!(foo.name, "Foo");
        assert_eq!(foo.methods.len(), 1);

        let bar = &foo.methods[0];
        assert_eq!(bar.name, "bar:");
        assert!(bar.is_instance);

        let (ret, params) = bar.prototype().unwrap();
        assert_eq!(ret.kind, crate::type_decode::Kind::Primitive(crate::type_decode::PrimitiveKind::Void));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn missing_objc_sections_yield_empty_catalog() {
        let image = single_segment_image("__TEXT", 0x1000, vec![0u8; 16]);
        let catalog = parse(&image);
        assert_eq!(catalog.classes().count(), 0);
        assert_eq!(catalog.protocols().count(), 0);
    }

    #[test]
    fn self_referential_superclass_is_treated_as_absent() {
        let base: u64 = 0x1000;
        let mut buf = vec![0u8; 0x200];
        let write_u64 = |buf: &mut Vec<u8>, off: u64, v: u64| {
            buf[off as usize..off as usize + 8].copy_from_slice(&v.to_le_bytes());
        };
        let write_u32 = |buf: &mut Vec<u8>, off: u64, v: u32| {
            buf[off as usize..off as usize + 4].copy_from_slice(&v.to_le_bytes());
        };

        write_u64(&mut buf, 0x0, 0x1100);
        // objc_class_t @ 0x1100: super_class points at itself.
        write_u64(&mut buf, 0x100, 0x1100);
        write_u64(&mut buf, 0x100 + 32, 0x1140);
        // class_ro_t @ 0x1140
        write_u32(&mut buf, 0x140, 0);
        write_u32(&mut buf, 0x144, 0);
        write_u32(&mut buf, 0x148, 0);
        write_u64(&mut buf, 0x140 + 24, 0x1180);
        buf[0x180..0x184].copy_from_slice(b"X\0\0\0");

        let image = segment_with_section_image("__DATA", base, buf, &[("__objc_classlist", base, 8)]);
        let catalog = parse(&image);
        let classes: Vec<&Class> = catalog.classes().collect();
        assert_eq!(classes.len(), 1);
        assert!(classes[0].superclass.is_none());
    }
}
