/// Builds a `Vec<HostSymbol>` from function items, using each item's path as its name.
///
/// An explicit name may be given with `"name" => item`.
///
/// # Example
/// ```rust
/// use elf_dlmod::host_symbols;
///
/// extern "C" fn putchar(c: i32) -> i32 { c }
/// extern "C" fn abs(v: i32) -> i32 { v.abs() }
///
/// let table = host_symbols![putchar, "labs" => abs];
/// assert_eq!(table.len(), 2);
/// assert_eq!(table[1].name, "labs");
/// ```
#[macro_export]
macro_rules! host_symbols {
    (@push $table:ident; $name:literal => $func:path $(, $($rest:tt)*)?) => {
        $table.push($crate::symbol::HostSymbol::new($name, $func as *const ()));
        $($crate::host_symbols!(@push $table; $($rest)*);)?
    };
    (@push $table:ident; $func:path $(, $($rest:tt)*)?) => {
        $table.push($crate::symbol::HostSymbol::new(stringify!($func), $func as *const ()));
        $($crate::host_symbols!(@push $table; $($rest)*);)?
    };
    (@push $table:ident;) => {};
    () => {
        $crate::__private::Vec::<$crate::symbol::HostSymbol>::new()
    };
    ($($entry:tt)+) => {{
        let mut table = $crate::__private::Vec::<$crate::symbol::HostSymbol>::new();
        $crate::host_symbols!(@push table; $($entry)+);
        table
    }};
}
