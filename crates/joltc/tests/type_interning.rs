use joltc::types::{Primitive, TypeTable, POINTER_SIZE};

#[test]
fn class_descriptors_are_interned() {
    let mut types = TypeTable::new();
    let a = types.for_class("Dog");
    let b = types.for_class("Dog");
    assert_eq!(a, b);
    assert_ne!(a, types.for_class("Cat"));
}

#[test]
fn array_descriptors_are_interned() {
    let mut types = TypeTable::new();
    let int = types.primitive(Primitive::Int);
    assert_eq!(types.for_array(int, 2), types.for_array(int, 2));
    let dog = types.for_class("Dog");
    assert_eq!(types.for_array(dog, 1), types.for_array(dog, 1));
    assert_ne!(types.for_array(int, 1), types.for_array(int, 2));
}

#[test]
fn zero_dimension_degenerates_to_base() {
    let mut types = TypeTable::new();
    let int = types.primitive(Primitive::Int);
    assert_eq!(types.for_array(int, 0), int);
    let dog = types.for_class("Dog");
    assert_eq!(types.for_array(dog, 0), dog);
}

#[test]
fn array_size_is_always_header_size() {
    let mut types = TypeTable::new();
    let int = types.primitive(Primitive::Int);
    let double = types.primitive(Primitive::Double);
    let dog = types.for_class("Dog");
    let header = types.size(int) + POINTER_SIZE;

    for ty in [
        types.for_array(int, 1),
        types.for_array(int, 3),
        types.for_array(double, 2),
        types.for_array(dog, 1),
    ] {
        assert_eq!(types.size(ty), header);
    }
}

#[test]
fn array_base_type_is_one_dimension_lower() {
    let mut types = TypeTable::new();
    let int = types.primitive(Primitive::Int);
    let one = types.for_array(int, 1);
    let two = types.for_array(int, 2);
    assert_eq!(types.base_type(two), one);
    assert_eq!(types.base_type(one), int);
    assert_eq!(types.dimension(two), 2);
    assert_eq!(types.dimension(int), 0);
}

#[test]
fn array_of_array_normalizes_to_total_dimension() {
    let mut types = TypeTable::new();
    let int = types.primitive(Primitive::Int);
    let one = types.for_array(int, 1);
    // Building on an array base adds dimensions, it does not nest names.
    assert_eq!(types.for_array(one, 1), types.for_array(int, 2));
}

#[test]
fn descriptor_names() {
    let mut types = TypeTable::new();
    let int = types.primitive(Primitive::Int);
    assert_eq!(types.asm_name(int), "i32");
    assert_eq!(types.real_name(int), "int");

    let dog = types.for_class("Dog");
    assert_eq!(types.asm_name(dog), "%Dog");
    assert!(types.is_object(dog));
    assert!(!types.is_primitive(dog));

    let two = types.for_array(int, 2);
    assert_eq!(types.real_name(two), "int[][]");
    assert_eq!(types.readable_name(two), "int_2D");
    assert_eq!(types.asm_name(two), "%Array_int_2D");
    assert!(types.is_array(two));
}

#[test]
fn primitive_defaults() {
    use joltc::types::Lit;
    let types = TypeTable::new();
    assert_eq!(
        types.default_value(types.primitive(Primitive::Int)),
        Some(Lit::Int(0))
    );
    assert_eq!(
        types.default_value(types.primitive(Primitive::Bool)),
        Some(Lit::Bool(false))
    );
    assert_eq!(types.default_value(types.primitive(Primitive::Void)), None);
}
