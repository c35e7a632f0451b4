//! MIDL proxy file layouts (`rpcproxy.h`).

use std::ffi::{c_char, c_void, CStr};
use windows::core::GUID;

use crate::model::descriptor::{InterfaceDescriptor, ProxyDescriptorTable, ProxyFileEntry};
use crate::model::guid::Guid;

/// `void RPC_ENTRY GetProxyDllInfo(const ProxyFileInfo***, const CLSID**)`.
pub type GetProxyDllInfoFn =
    unsafe extern "system" fn(*mut *const *const ProxyFileInfo, *mut *const GUID);

/// Leading header of every `CInterfaceStubVtbl`.
#[repr(C)]
pub struct CInterfaceStubHeader {
    pub piid: *const GUID,
    pub server_info: *const c_void,
    pub dispatch_table_count: u32,
    pub dispatch_table: *const c_void,
}

#[repr(C)]
pub struct ProxyFileInfo {
    pub proxy_vtbl_list: *const c_void,
    pub stub_vtbl_list: *const *const CInterfaceStubHeader,
    pub names_array: *const *const c_char,
    pub delegated_iids: *const *const GUID,
    pub iid_lookup: *const c_void,
    pub table_size: u16,
    pub table_version: u16,
    pub async_iid_lookup: *const *const GUID,
    pub filler2: isize,
    pub filler3: isize,
    pub filler4: isize,
}

pub fn guid_from_native(value: &GUID) -> Guid {
    Guid::from_fields(value.data1, value.data2, value.data3, value.data4)
}

pub fn guid_to_native(value: Guid) -> GUID {
    let (data1, data2, data3, data4) = value.to_fields();
    GUID::from_values(data1, data2, data3, data4)
}

/// Copies a nul-terminated `ProxyFileInfo*` array into an owned table.
///
/// # Safety
/// `files` must point at a valid, nul-terminated array produced by a loaded
/// MIDL proxy DLL, and the DLL must stay loaded for the duration of the call.
pub unsafe fn read_descriptor_table(files: *const *const ProxyFileInfo) -> ProxyDescriptorTable {
    let mut entries = Vec::new();
    let mut cursor = files;
    while !(*cursor).is_null() {
        let file = &**cursor;
        let mut interfaces = Vec::with_capacity(usize::from(file.table_size));
        for index in 0..file.table_size {
            let slot = usize::from(index);
            let stub = *file.stub_vtbl_list.add(slot);
            let iid = guid_from_native(&*(*stub).piid);
            let name = CStr::from_ptr(*file.names_array.add(slot))
                .to_string_lossy()
                .into_owned();
            interfaces.push(InterfaceDescriptor::new(iid, name, index));
        }
        entries.push(ProxyFileEntry { interfaces });
        cursor = cursor.add(1);
    }
    ProxyDescriptorTable::new(entries)
}

#[cfg(test)]
mod tests {
    use super::{guid_from_native, read_descriptor_table, CInterfaceStubHeader, ProxyFileInfo};
    use crate::model::guid::Guid;
    use std::ffi::c_char;
    use std::ptr::null;
    use windows::core::GUID;

    const IID_A: GUID = GUID::from_u128(0x0000000a_0000_0000_c000_000000000046);
    const IID_B: GUID = GUID::from_u128(0x0000000b_0000_0000_c000_000000000046);
    const IID_C: GUID = GUID::from_u128(0x0000000c_0000_0000_c000_000000000046);

    fn stub(iid: &GUID) -> CInterfaceStubHeader {
        CInterfaceStubHeader {
            piid: iid,
            server_info: null(),
            dispatch_table_count: 3,
            dispatch_table: null(),
        }
    }

    fn proxy_file(
        stubs: &[*const CInterfaceStubHeader],
        names: &[*const c_char],
    ) -> ProxyFileInfo {
        ProxyFileInfo {
            proxy_vtbl_list: null(),
            stub_vtbl_list: stubs.as_ptr(),
            names_array: names.as_ptr(),
            delegated_iids: null(),
            iid_lookup: null(),
            table_size: u16::try_from(stubs.len()).expect("small table"),
            table_version: 2,
            async_iid_lookup: null(),
            filler2: 0,
            filler3: 0,
            filler4: 0,
        }
    }

    fn iid(native: &GUID) -> Guid {
        guid_from_native(native)
    }

    #[test]
    fn proxy_file_info_matches_rpcproxy_layout() {
        // Five pointers, two u16 fields padded to a pointer, one pointer, three LONG_PTRs.
        assert_eq!(
            std::mem::size_of::<ProxyFileInfo>(),
            std::mem::size_of::<usize>() * 10
        );
        assert_eq!(
            std::mem::size_of::<CInterfaceStubHeader>(),
            std::mem::size_of::<usize>() * 4
        );
    }

    #[test]
    fn walks_files_in_order_until_null_entry() {
        let (stub_a, stub_b, stub_c) = (stub(&IID_A), stub(&IID_B), stub(&IID_C));
        let first_stubs: [*const CInterfaceStubHeader; 2] = [&stub_a, &stub_b];
        let first_names: [*const c_char; 2] =
            [b"IFirstA\0".as_ptr().cast(), b"IFirstB\0".as_ptr().cast()];
        let second_stubs: [*const CInterfaceStubHeader; 1] = [&stub_c];
        let second_names: [*const c_char; 1] = [b"ISecondC\0".as_ptr().cast()];
        let first = proxy_file(&first_stubs, &first_names);
        let second = proxy_file(&second_stubs, &second_names);
        let files: [*const ProxyFileInfo; 3] = [&first, &second, null()];

        // SAFETY: every pointer above is live for the call and the list ends in null.
        let table = unsafe { read_descriptor_table(files.as_ptr()) };

        assert_eq!(table.files.len(), 2);
        let first_file: Vec<(Guid, &str, u16)> = table.files[0]
            .interfaces
            .iter()
            .map(|d| (d.iid, d.name.as_str(), d.index))
            .collect();
        assert_eq!(
            first_file,
            [(iid(&IID_A), "IFirstA", 0), (iid(&IID_B), "IFirstB", 1)]
        );
        let second_file: Vec<(Guid, &str, u16)> = table.files[1]
            .interfaces
            .iter()
            .map(|d| (d.iid, d.name.as_str(), d.index))
            .collect();
        assert_eq!(second_file, [(iid(&IID_C), "ISecondC", 0)]);

        let order: Vec<Guid> = table.interfaces().map(|d| d.iid).collect();
        assert_eq!(order, [iid(&IID_A), iid(&IID_B), iid(&IID_C)]);
        assert_eq!(
            iid(&IID_A),
            Guid::from_fields(0xA, 0, 0, [0xC0, 0, 0, 0, 0, 0, 0, 0x46])
        );
    }

    #[test]
    fn null_only_list_yields_empty_table() {
        let files: [*const ProxyFileInfo; 1] = [null()];

        // SAFETY: single null terminator.
        let table = unsafe { read_descriptor_table(files.as_ptr()) };

        assert!(table.files.is_empty());
        assert_eq!(table.interface_count(), 0);
    }
}
