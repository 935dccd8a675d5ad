//! XML generation for libvirt domain definitions.

use quick_xml::escape::escape;

use crate::types::{CreateVmRequest, ImageFormat};

/// Builder for libvirt domain XML.
pub struct DomainXmlBuilder<'a> {
    req: &'a CreateVmRequest,
}

impl<'a> DomainXmlBuilder<'a> {
    /// Create a new XML builder for the given request.
    pub fn new(req: &'a CreateVmRequest) -> Self {
        Self { req }
    }

    /// Disk driver type for the request's image: qcow2 when the name says so,
    /// raw for everything else.
    pub fn disk_driver(&self) -> &'static str {
        match ImageFormat::from_name(&self.req.image) {
            ImageFormat::Qcow2 => "qcow2",
            _ => "raw",
        }
    }

    /// Memory in KiB, as libvirt expects it.
    pub fn memory_kib(&self) -> u64 {
        self.req.memory_bytes / 1024
    }

    /// Build the domain XML string.
    pub fn build(&self) -> String {
        let mut xml = String::new();

        xml.push_str(&format!(
            r#"<domain type='kvm'>
  <name>{}</name>
  <memory unit='KiB'>{}</memory>
  <vcpu>{}</vcpu>
  <os>
    <type arch='x86_64'>hvm</type>
  </os>
"#,
            escape(self.req.name.as_str()),
            self.memory_kib(),
            self.req.cpu
        ));

        xml.push_str("  <devices>\n");
        xml.push_str(&self.build_disk());
        xml.push_str(&self.build_graphics());
        xml.push_str("  </devices>\n");

        xml.push_str("</domain>\n");

        xml
    }

    fn build_disk(&self) -> String {
        format!(
            r#"    <disk type='file' device='disk'>
      <driver name='qemu' type='{}'/>
      <source file='{}'/>
      <target dev='vda' bus='virtio'/>
    </disk>
"#,
            self.disk_driver(),
            escape(self.req.image.as_str())
        )
    }

    fn build_graphics(&self) -> String {
        "    <graphics type='vnc' autoport='yes'/>\n".to_string()
    }
}
